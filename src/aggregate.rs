use std::collections::{BTreeMap, HashSet};

use crate::models::{
    DsrAggregates, IncidentRecord, Rankings, RoadStatus, SeverityRecord, SeverityWeights, Totals,
};

pub fn severity_score(record: &IncidentRecord, weights: &SeverityWeights) -> f64 {
    weights.death * record.deaths as f64
        + weights.injured * record.injured as f64
        + weights.houses_full * record.houses_full as f64
        + weights.houses_partial * record.houses_partial as f64
        + weights.school * record.schools as f64
        + weights.other * record.other as f64
        + weights.cattle * record.cattle as f64
}

pub fn compute_aggregates(records: &[IncidentRecord], weights: &SeverityWeights) -> DsrAggregates {
    let mut totals = Totals::default();
    let mut reporting: HashSet<&str> = HashSet::new();

    for record in records {
        totals.deaths = totals.deaths.saturating_add(record.deaths);
        totals.injured = totals.injured.saturating_add(record.injured);
        totals.houses_full = totals.houses_full.saturating_add(record.houses_full);
        totals.houses_partial = totals.houses_partial.saturating_add(record.houses_partial);
        totals.schools = totals.schools.saturating_add(record.schools);
        totals.other = totals.other.saturating_add(record.other);
        totals.cattle = totals.cattle.saturating_add(record.cattle);

        if record.has_activity() {
            reporting.insert(record.district.as_str());
        }
    }
    totals.houses_total = totals.houses_full.saturating_add(totals.houses_partial);
    totals.districts_reporting = reporting.len();

    let severity_records: Vec<SeverityRecord> = records
        .iter()
        .map(|record| SeverityRecord {
            district: record.district.clone(),
            division: record.division.clone(),
            deaths: record.deaths,
            injured: record.injured,
            houses_full: record.houses_full,
            houses_partial: record.houses_partial,
            schools: record.schools,
            other: record.other,
            cattle: record.cattle,
            severity: severity_score(record, weights),
        })
        .collect();

    // sort_by_key is stable, so equal counts keep their input order
    let mut top_deaths = severity_records.clone();
    top_deaths.sort_by_key(|entry| std::cmp::Reverse(entry.deaths));

    let mut top_houses = severity_records.clone();
    top_houses.sort_by_key(|entry| std::cmp::Reverse(entry.houses_total()));

    let narratives: BTreeMap<String, String> = records
        .iter()
        .filter(|record| !record.narrative.trim().is_empty())
        .map(|record| (record.district.clone(), record.narrative.trim().to_string()))
        .collect();

    let road_status = records
        .iter()
        .filter(|record| !record.roads.trim().is_empty())
        .map(|record| RoadStatus {
            district: record.district.clone(),
            notes: record.roads.trim().to_string(),
        })
        .collect();

    DsrAggregates {
        totals,
        severity_records,
        rankings: Rankings {
            top_deaths,
            top_houses,
        },
        narratives,
        road_status,
    }
}

/// Narrows the per-district views to `selected`. An empty selection means
/// no filter. Totals stay province-wide either way.
pub fn apply_district_filter(aggregates: &DsrAggregates, selected: &[String]) -> DsrAggregates {
    if selected.is_empty() {
        return aggregates.clone();
    }

    let keep: HashSet<&str> = selected.iter().map(String::as_str).collect();
    let retain = |entries: &[SeverityRecord]| -> Vec<SeverityRecord> {
        entries
            .iter()
            .filter(|entry| keep.contains(entry.district.as_str()))
            .cloned()
            .collect()
    };

    DsrAggregates {
        totals: aggregates.totals.clone(),
        severity_records: retain(&aggregates.severity_records[..]),
        rankings: Rankings {
            top_deaths: retain(&aggregates.rankings.top_deaths[..]),
            top_houses: retain(&aggregates.rankings.top_houses[..]),
        },
        narratives: aggregates
            .narratives
            .iter()
            .filter(|(district, _)| keep.contains(district.as_str()))
            .map(|(district, text)| (district.clone(), text.clone()))
            .collect(),
        road_status: aggregates
            .road_status
            .iter()
            .filter(|status| keep.contains(status.district.as_str()))
            .cloned()
            .collect(),
    }
}
