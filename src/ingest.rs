use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::IncidentRecord;

const DISTRICT_KEYS: &[&str] = &["district", "districtName", "district_name"];
const DIVISION_KEYS: &[&str] = &["division", "divisionName", "division_name"];
const DEATH_KEYS: &[&str] = &["deaths", "death", "dead"];
const INJURED_KEYS: &[&str] = &["injured", "injuries"];
const HOUSES_FULL_KEYS: &[&str] = &["housesFull", "houses_full", "fullyDamaged"];
const HOUSES_PARTIAL_KEYS: &[&str] = &["housesPartial", "houses_partial", "partiallyDamaged"];
const SCHOOL_KEYS: &[&str] = &["schoolsDamaged", "schools_damaged", "schools", "school"];
const OTHER_KEYS: &[&str] = &["otherStructures", "other_structures", "other"];
const CATTLE_KEYS: &[&str] = &["cattleLost", "cattle_lost", "livestock", "cattle"];
const ROAD_KEYS: &[&str] = &["roadBlockages", "road_blockages", "roads"];
const NARRATIVE_KEYS: &[&str] = &["narrative", "remarks"];

/// Pulls the incident rows out of whatever shape the backend answered with.
pub fn parse_incidents(payload: &Value) -> Vec<IncidentRecord> {
    let Some(rows) = record_rows(payload) else {
        warn!("incident payload has no record array; treating as empty");
        return Vec::new();
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match row.as_object().and_then(parse_record) {
            Some(record) => records.push(record),
            None => debug!("skipping incident row without a district"),
        }
    }

    merge_duplicate_districts(records)
}

fn record_rows(payload: &Value) -> Option<&Vec<Value>> {
    match payload {
        Value::Array(rows) => Some(rows),
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(rows)) => Some(rows),
            Some(Value::Object(inner)) => ["records", "incidents"]
                .iter()
                .find_map(|key| inner.get(*key).and_then(Value::as_array)),
            _ => None,
        },
        _ => None,
    }
}

pub fn parse_record(row: &Map<String, Value>) -> Option<IncidentRecord> {
    let district = text(row, DISTRICT_KEYS);
    if district.is_empty() {
        return None;
    }

    Some(IncidentRecord {
        district,
        division: text(row, DIVISION_KEYS),
        deaths: count(row, DEATH_KEYS),
        injured: count(row, INJURED_KEYS),
        houses_full: count(row, HOUSES_FULL_KEYS),
        houses_partial: count(row, HOUSES_PARTIAL_KEYS),
        schools: count(row, SCHOOL_KEYS),
        other: count(row, OTHER_KEYS),
        cattle: count(row, CATTLE_KEYS),
        roads: text(row, ROAD_KEYS),
        narrative: text(row, NARRATIVE_KEYS),
    })
}

fn lookup<'a>(row: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| row.get(*key).filter(|value| !value.is_null()))
}

fn text(row: &Map<String, Value>, keys: &[&str]) -> String {
    match lookup(row, keys) {
        Some(Value::String(value)) => value.trim().to_string(),
        Some(Value::Number(value)) => value.to_string(),
        _ => String::new(),
    }
}

fn count(row: &Map<String, Value>, keys: &[&str]) -> u64 {
    lookup(row, keys).map(coerce_count).unwrap_or(0)
}

/// Upstream counts arrive as numbers, numeric strings, or junk. Junk is 0.
pub fn coerce_count(value: &Value) -> u64 {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().map(clamp_float))
            .unwrap_or(0),
        Value::String(raw) => {
            let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
            cleaned.parse::<f64>().map(clamp_float).unwrap_or(0)
        }
        _ => 0,
    }
}

fn clamp_float(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.trunc() as u64
    } else {
        0
    }
}

fn merge_duplicate_districts(records: Vec<IncidentRecord>) -> Vec<IncidentRecord> {
    let mut merged: Vec<IncidentRecord> = Vec::with_capacity(records.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        match index.get(&record.district) {
            Some(&position) => {
                warn!(district = %record.district, "duplicate district in snapshot; merging rows");
                let existing = &mut merged[position];
                existing.deaths = existing.deaths.saturating_add(record.deaths);
                existing.injured = existing.injured.saturating_add(record.injured);
                existing.houses_full = existing.houses_full.saturating_add(record.houses_full);
                existing.houses_partial =
                    existing.houses_partial.saturating_add(record.houses_partial);
                existing.schools = existing.schools.saturating_add(record.schools);
                existing.other = existing.other.saturating_add(record.other);
                existing.cattle = existing.cattle.saturating_add(record.cattle);
                join_text(&mut existing.roads, &record.roads);
                join_text(&mut existing.narrative, &record.narrative);
                if existing.division.is_empty() {
                    existing.division = record.division;
                }
            }
            None => {
                index.insert(record.district.clone(), merged.len());
                merged.push(record);
            }
        }
    }

    merged
}

fn join_text(target: &mut String, addition: &str) {
    let addition = addition.trim();
    if addition.is_empty() {
        return;
    }
    if !target.trim().is_empty() {
        target.push_str("; ");
    }
    target.push_str(addition);
}

/// Offline snapshot: a CSV export of the incident list with a header row.
pub fn read_incident_csv(csv_path: &Path) -> anyhow::Result<Vec<IncidentRecord>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let row = result.with_context(|| format!("malformed row in {}", csv_path.display()))?;
        let object: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(header, field)| (header.trim().to_string(), Value::String(field.to_string())))
            .collect();
        rows.push(Value::Object(object));
    }

    Ok(parse_incidents(&Value::Array(rows)))
}
