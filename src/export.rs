use anyhow::Context;
use chrono::NaiveDate;
use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::models::DsrAggregates;

pub const CSV_HEADER: [&str; 9] = [
    "District",
    "Deaths",
    "Injured",
    "Houses Full",
    "Houses Partial",
    "Schools",
    "Other",
    "Cattle",
    "Severity",
];

/// Plain comma-joined table of the severity records. Fields are never
/// quoted, so district names must not contain commas.
pub fn export_to_csv(aggregates: &DsrAggregates) -> anyhow::Result<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;
    for entry in &aggregates.severity_records {
        writer.write_record([
            entry.district.clone(),
            entry.deaths.to_string(),
            entry.injured.to_string(),
            entry.houses_full.to_string(),
            entry.houses_partial.to_string(),
            entry.schools.to_string(),
            entry.other.to_string(),
            entry.cattle.to_string(),
            format!("{:.2}", entry.severity),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("failed to flush csv buffer: {err}"))?;
    let mut output = String::from_utf8(bytes).context("csv output was not utf-8")?;
    if output.ends_with('\n') {
        output.pop();
    }
    Ok(output)
}

pub fn export_filename(date: NaiveDate) -> String {
    format!("dsr-analysis-{}.csv", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::compute_aggregates;
    use crate::models::{IncidentRecord, SeverityWeights};

    #[test]
    fn single_district_exports_two_lines() {
        let records = vec![IncidentRecord {
            district: "Swat".to_string(),
            deaths: 3,
            injured: 1,
            houses_partial: 4,
            ..IncidentRecord::default()
        }];
        let aggregates = compute_aggregates(&records, &SeverityWeights::default());
        let csv = export_to_csv(&aggregates).unwrap();

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| line.matches(',').count() == 8));
        assert_eq!(
            lines[0],
            "District,Deaths,Injured,Houses Full,Houses Partial,Schools,Other,Cattle,Severity"
        );
        assert_eq!(lines[1], "Swat,3,1,0,4,0,0,0,37.00");
    }

    #[test]
    fn empty_aggregates_export_header_only() {
        let csv = export_to_csv(&DsrAggregates::default()).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn severity_rounds_to_two_places() {
        let records = vec![IncidentRecord {
            district: "Kohat".to_string(),
            cattle: 1,
            ..IncidentRecord::default()
        }];
        let weights = SeverityWeights {
            cattle: 1.0 / 3.0,
            ..SeverityWeights::zero()
        };
        let csv = export_to_csv(&compute_aggregates(&records, &weights)).unwrap();
        assert!(csv.ends_with(",0.33"));
    }

    #[test]
    fn filename_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 16).unwrap();
        assert_eq!(export_filename(date), "dsr-analysis-2025-08-16.csv");
    }
}
