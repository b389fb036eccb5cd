use std::future::Future;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::api::{ApiClient, ApiError};
use crate::freshness::{Ticket, ViewParams, ViewState};
use crate::models::{DsrAggregates, IncidentRecord, SeverityWeights};

#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Follows the current day when unset.
    pub fixed_date: Option<NaiveDate>,
    pub districts: Vec<String>,
    pub weights: SeverityWeights,
    pub interval: Duration,
}

type Delivery = (Ticket, Result<Vec<IncidentRecord>, ApiError>);

/// Re-fetches the snapshot every `interval` and hands each fresh aggregate
/// to `render` until `shutdown` resolves. A 401 ends the loop with
/// [`ApiError::Unauthorized`].
pub async fn watch<F, R>(
    client: ApiClient,
    options: WatchOptions,
    shutdown: F,
    mut render: R,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
    R: FnMut(&ViewParams, &DsrAggregates),
{
    let (tx, mut rx) = mpsc::channel::<Delivery>(8);
    let mut view = ViewState::default();
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let date = options.fixed_date.unwrap_or_else(|| Utc::now().date_naive());
                let params = ViewParams { date, districts: options.districts.clone() };
                if !view.needs_fetch(&params) {
                    debug!(%date, "previous refresh still in flight; skipping tick");
                    continue;
                }

                let ticket = view.issue(params);
                let client = client.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let result = client.fetch_incidents(ticket.params.date).await;
                    let _ = tx.send((ticket, result)).await;
                });
            }
            Some((ticket, result)) = rx.recv() => {
                if !view.accept(&ticket) {
                    continue;
                }
                match result {
                    Ok(records) => {
                        let aggregates = aggregate::compute_aggregates(&records, &options.weights);
                        let filtered = aggregate::apply_district_filter(&aggregates, &ticket.params.districts);
                        render(&ticket.params, &filtered);
                    }
                    Err(ApiError::Unauthorized) => return Err(ApiError::Unauthorized.into()),
                    Err(err) => warn!(error = %err, "refresh failed; keeping previous figures"),
                }
            }
            _ = &mut shutdown => {
                info!(params = ?view.current(), "stopping watch");
                return Ok(());
            }
        }
    }
}
