use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{DsrAggregates, SeverityRecord, Totals};

pub fn kpi_row(totals: &Totals) -> Vec<(&'static str, u64)> {
    vec![
        ("Deaths", totals.deaths),
        ("Injured", totals.injured),
        ("Houses damaged", totals.houses_total),
        ("Houses fully damaged", totals.houses_full),
        ("Houses partially damaged", totals.houses_partial),
        ("Schools damaged", totals.schools),
        ("Other structures", totals.other),
        ("Livestock lost", totals.cattle),
        ("Districts reporting", totals.districts_reporting as u64),
    ]
}

fn scope_label(districts: &[String]) -> String {
    if districts.is_empty() {
        "all districts".to_string()
    } else {
        districts.join(", ")
    }
}

fn write_ranking(output: &mut String, entries: &[SeverityRecord], metric: fn(&SeverityRecord) -> u64) {
    if entries.is_empty() {
        let _ = writeln!(output, "No districts reported for this date.");
        return;
    }
    for (position, entry) in entries.iter().enumerate() {
        let _ = writeln!(
            output,
            "{}. {} ({}) {}",
            position + 1,
            entry.district,
            if entry.division.is_empty() { "-" } else { entry.division.as_str() },
            metric(entry)
        );
    }
}

pub fn build_report(
    date: NaiveDate,
    districts: &[String],
    aggregates: &DsrAggregates,
    top: usize,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Daily Situation Report");
    let _ = writeln!(output, "Report date {} for {}", date, scope_label(districts));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Key Figures");
    if !districts.is_empty() {
        let _ = writeln!(output, "_Totals are province-wide; tables below follow the district filter._");
    }
    for (label, value) in kpi_row(&aggregates.totals) {
        let _ = writeln!(output, "- {label}: {value}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Deaths by District");
    write_ranking(&mut output, aggregates.rankings.top_deaths(top), |entry| entry.deaths);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Houses Damaged by District");
    write_ranking(&mut output, aggregates.rankings.top_houses(top), |entry| {
        entry.houses_total()
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Severity");
    let ranked = aggregates.severity_ranking();
    if ranked.is_empty() {
        let _ = writeln!(output, "No districts reported for this date.");
    } else {
        let _ = writeln!(
            output,
            "| District | Deaths | Injured | Houses Full | Houses Partial | Schools | Other | Cattle | Severity |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|");
        for entry in ranked.iter() {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} | {} | {} | {:.2} |",
                entry.district,
                entry.deaths,
                entry.injured,
                entry.houses_full,
                entry.houses_partial,
                entry.schools,
                entry.other,
                entry.cattle,
                entry.severity
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Road Status");
    if aggregates.road_status.is_empty() {
        let _ = writeln!(output, "No road blockages reported.");
    } else {
        for status in aggregates.road_status.iter() {
            let _ = writeln!(output, "- {}: {}", status.district, status.notes);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## District Narratives");
    if aggregates.narratives.is_empty() {
        let _ = writeln!(output, "No narratives submitted.");
    } else {
        for (district, text) in aggregates.narratives.iter() {
            let _ = writeln!(output, "- **{district}**: {text}");
        }
    }

    output
}

pub fn print_summary(date: NaiveDate, districts: &[String], aggregates: &DsrAggregates, top: usize) {
    println!("Situation report for {} ({})", date, scope_label(districts));
    for (label, value) in kpi_row(&aggregates.totals) {
        println!("  {label:<26} {value}");
    }

    let ranked = aggregates.severity_ranking();
    if ranked.is_empty() {
        println!("No districts reported for this date.");
        return;
    }

    println!("Most severe districts:");
    for entry in ranked.iter().take(top) {
        println!(
            "- {} score {:.2} ({} deaths, {} houses damaged)",
            entry.district,
            entry.severity,
            entry.deaths,
            entry.houses_total()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{apply_district_filter, compute_aggregates};
    use crate::models::{IncidentRecord, SeverityWeights};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 16).unwrap()
    }

    fn records() -> Vec<IncidentRecord> {
        vec![
            IncidentRecord {
                district: "Buner".to_string(),
                division: "Malakand".to_string(),
                deaths: 12,
                houses_full: 9,
                narrative: "Cloudburst over Pir Baba".to_string(),
                ..IncidentRecord::default()
            },
            IncidentRecord {
                district: "Bajaur".to_string(),
                deaths: 3,
                roads: "Khar road blocked by landslide".to_string(),
                ..IncidentRecord::default()
            },
        ]
    }

    #[test]
    fn kpi_houses_total_matches_parts() {
        let aggregates = compute_aggregates(&records(), &SeverityWeights::default());
        let kpis = kpi_row(&aggregates.totals);
        assert_eq!(kpis[2], ("Houses damaged", 9));
        assert_eq!(kpis[8], ("Districts reporting", 2));
    }

    #[test]
    fn report_contains_every_section() {
        let aggregates = compute_aggregates(&records(), &SeverityWeights::default());
        let report = build_report(date(), &[], &aggregates, 5);

        assert!(report.contains("Report date 2025-08-16 for all districts"));
        assert!(report.contains("1. Buner (Malakand) 12"));
        assert!(report.contains("2. Bajaur (-) 3"));
        assert!(report.contains("- Bajaur: Khar road blocked by landslide"));
        assert!(report.contains("- **Buner**: Cloudburst over Pir Baba"));
        assert!(!report.contains("province-wide"));
    }

    #[test]
    fn filtered_report_flags_province_totals() {
        let aggregates = compute_aggregates(&records(), &SeverityWeights::default());
        let selected = vec!["Bajaur".to_string()];
        let filtered = apply_district_filter(&aggregates, &selected);
        let report = build_report(date(), &selected, &filtered, 5);

        assert!(report.contains("province-wide"));
        assert!(report.contains("- Deaths: 15"));
        assert!(report.contains("No narratives submitted."));
        assert!(!report.contains("1. Buner"));
    }

    #[test]
    fn empty_snapshot_renders_placeholders() {
        let aggregates = compute_aggregates(&[], &SeverityWeights::default());
        let report = build_report(date(), &[], &aggregates, 5);
        assert!(report.contains("No districts reported for this date."));
        assert!(report.contains("No road blockages reported."));
    }
}
