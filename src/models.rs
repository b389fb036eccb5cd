use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One district's row in a daily situation report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentRecord {
    pub district: String,
    pub division: String,
    pub deaths: u64,
    pub injured: u64,
    pub houses_full: u64,
    pub houses_partial: u64,
    pub schools: u64,
    pub other: u64,
    pub cattle: u64,
    pub roads: String,
    pub narrative: String,
}

impl IncidentRecord {
    pub fn has_activity(&self) -> bool {
        [
            self.deaths,
            self.injured,
            self.houses_full,
            self.houses_partial,
            self.schools,
            self.other,
            self.cattle,
        ]
        .iter()
        .any(|count| *count > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityWeights {
    #[serde(default)]
    pub death: f64,
    #[serde(default)]
    pub injured: f64,
    #[serde(default, alias = "housesFull")]
    pub houses_full: f64,
    #[serde(default, alias = "housesPartial")]
    pub houses_partial: f64,
    #[serde(default)]
    pub school: f64,
    #[serde(default)]
    pub other: f64,
    #[serde(default)]
    pub cattle: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            death: 10.0,
            injured: 3.0,
            houses_full: 2.0,
            houses_partial: 1.0,
            school: 2.0,
            other: 0.5,
            cattle: 0.1,
        }
    }
}

impl SeverityWeights {
    #[cfg(test)]
    pub fn zero() -> Self {
        Self {
            death: 0.0,
            injured: 0.0,
            houses_full: 0.0,
            houses_partial: 0.0,
            school: 0.0,
            other: 0.0,
            cattle: 0.0,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let named = [
            ("death", self.death),
            ("injured", self.injured),
            ("houses_full", self.houses_full),
            ("houses_partial", self.houses_partial),
            ("school", self.school),
            ("other", self.other),
            ("cattle", self.cattle),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("severity weight {name} must be a non-negative number, got {value}");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub deaths: u64,
    pub injured: u64,
    pub houses_full: u64,
    pub houses_partial: u64,
    pub houses_total: u64,
    pub schools: u64,
    pub other: u64,
    pub cattle: u64,
    pub districts_reporting: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeverityRecord {
    pub district: String,
    pub division: String,
    pub deaths: u64,
    pub injured: u64,
    pub houses_full: u64,
    pub houses_partial: u64,
    pub schools: u64,
    pub other: u64,
    pub cattle: u64,
    pub severity: f64,
}

impl SeverityRecord {
    pub fn houses_total(&self) -> u64 {
        self.houses_full.saturating_add(self.houses_partial)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rankings {
    pub top_deaths: Vec<SeverityRecord>,
    pub top_houses: Vec<SeverityRecord>,
}

impl Rankings {
    pub fn top_deaths(&self, limit: usize) -> &[SeverityRecord] {
        &self.top_deaths[..limit.min(self.top_deaths.len())]
    }

    pub fn top_houses(&self, limit: usize) -> &[SeverityRecord] {
        &self.top_houses[..limit.min(self.top_houses.len())]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoadStatus {
    pub district: String,
    pub notes: String,
}

/// Everything the dashboard views derive from one day's incident snapshot.
///
/// Rebuilt from scratch whenever the snapshot or the weights change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DsrAggregates {
    pub totals: Totals,
    pub severity_records: Vec<SeverityRecord>,
    pub rankings: Rankings,
    pub narratives: BTreeMap<String, String>,
    pub road_status: Vec<RoadStatus>,
}

impl DsrAggregates {
    /// Severity table order: highest score first, input order on ties.
    pub fn severity_ranking(&self) -> Vec<SeverityRecord> {
        let mut ranked = self.severity_records.clone();
        ranked.sort_by(|a, b| {
            b.severity
                .partial_cmp(&a.severity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }
}
