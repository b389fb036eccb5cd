use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::models::SeverityWeights;

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub auth: String,
    pub incidents: String,
    pub relief: String,
    pub warehouse: String,
    pub gis: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoints: Endpoints,
    pub request_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let base = lookup("KPD3_API_URL")
            .context("KPD3_API_URL must be set to the dashboard API base URL")?;
        let endpoint = |key: &str| {
            lookup(key)
                .unwrap_or_else(|| base.clone())
                .trim_end_matches('/')
                .to_string()
        };

        let request_timeout = match lookup("KPD3_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("KPD3_TIMEOUT_SECS must be whole seconds, got {raw}"))?,
            )),
            None => None,
        };

        Ok(Self {
            endpoints: Endpoints {
                auth: endpoint("KPD3_AUTH_URL"),
                incidents: endpoint("KPD3_INCIDENTS_URL"),
                relief: endpoint("KPD3_RELIEF_URL"),
                warehouse: endpoint("KPD3_WAREHOUSE_URL"),
                gis: endpoint("KPD3_GIS_URL"),
            },
            request_timeout,
        })
    }
}

/// Session file location; available without the API settings so offline
/// commands can still read preferences.
pub fn state_file_from_env() -> PathBuf {
    state_file_from(std::env::var("KPD3_STATE_FILE").ok())
}

fn state_file_from(value: Option<String>) -> PathBuf {
    value
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".kpd3/session.json"))
}

/// Weight overrides from the command line, applied on top of a base set.
#[derive(Debug, Clone, Default)]
pub struct WeightOverrides {
    pub death: Option<f64>,
    pub injured: Option<f64>,
    pub houses_full: Option<f64>,
    pub houses_partial: Option<f64>,
    pub school: Option<f64>,
    pub other: Option<f64>,
    pub cattle: Option<f64>,
}

pub fn load_weights(
    path: Option<&Path>,
    overrides: &WeightOverrides,
) -> anyhow::Result<SeverityWeights> {
    let mut weights = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read weights file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a weights object", path.display()))?
        }
        None => SeverityWeights::default(),
    };

    let slots = [
        (&mut weights.death, overrides.death),
        (&mut weights.injured, overrides.injured),
        (&mut weights.houses_full, overrides.houses_full),
        (&mut weights.houses_partial, overrides.houses_partial),
        (&mut weights.school, overrides.school),
        (&mut weights.other, overrides.other),
        (&mut weights.cattle, overrides.cattle),
    ];
    for (slot, value) in slots {
        if let Some(value) = value {
            *slot = value;
        }
    }

    weights.validate()?;
    Ok(weights)
}
