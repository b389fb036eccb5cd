use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod api;
mod auth;
mod config;
mod export;
mod freshness;
mod ingest;
mod models;
mod report;
mod session;
mod watch;

use api::{ApiClient, ApiError, Dataset};
use config::{Config, WeightOverrides};
use models::{IncidentRecord, SeverityWeights};
use session::{FileStore, SessionContext};
use watch::WatchOptions;

#[derive(Parser)]
#[command(name = "kpd3")]
#[command(about = "Daily situation report aggregation for the KP flood relief dashboard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SnapshotArgs {
    /// Report date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Read the snapshot from a local CSV file instead of the API
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Restrict district tables to these districts (repeatable)
    #[arg(long = "district")]
    districts: Vec<String>,
    #[command(flatten)]
    weights: WeightArgs,
}

#[derive(Args, Clone)]
struct WeightArgs {
    /// JSON file of severity weights; missing keys count as 0
    #[arg(long)]
    weights: Option<PathBuf>,
    #[arg(long)]
    w_death: Option<f64>,
    #[arg(long)]
    w_injured: Option<f64>,
    #[arg(long)]
    w_houses_full: Option<f64>,
    #[arg(long)]
    w_houses_partial: Option<f64>,
    #[arg(long)]
    w_school: Option<f64>,
    #[arg(long)]
    w_other: Option<f64>,
    #[arg(long)]
    w_cattle: Option<f64>,
}

impl WeightArgs {
    fn resolve(&self) -> anyhow::Result<SeverityWeights> {
        let overrides = WeightOverrides {
            death: self.w_death,
            injured: self.w_injured,
            houses_full: self.w_houses_full,
            houses_partial: self.w_houses_partial,
            school: self.w_school,
            other: self.w_other,
            cattle: self.w_cattle,
        };
        config::load_weights(self.weights.as_deref(), &overrides)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the access token
    Login {
        #[arg(long)]
        username: String,
        /// Falls back to KPD3_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored token and user
    Logout,
    /// Show session and preference state
    Status,
    /// Update stored preferences
    Prefs {
        #[arg(long)]
        sidebar_collapsed: Option<bool>,
    },
    /// Aggregate one day's snapshot and print the KPIs and rankings
    Aggregate {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Print the aggregates as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export the severity table as CSV
    Export {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        /// Defaults to dsr-analysis-<date>.csv
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown situation report
    Report {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Dump one of the supporting datasets as JSON
    Fetch {
        #[arg(value_enum)]
        dataset: Dataset,
    },
    /// Re-fetch and re-aggregate on an interval until interrupted
    Watch {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long = "district")]
        districts: Vec<String>,
        #[command(flatten)]
        weights: WeightArgs,
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
}

type Session = SessionContext<FileStore>;

fn open_session() -> anyhow::Result<Session> {
    let path = config::state_file_from_env();
    let store = FileStore::open(&path)?;
    SessionContext::load(store, Utc::now())
}

fn authed_client(config: &Config, session: &Session) -> anyhow::Result<ApiClient> {
    if !session.is_authenticated(Utc::now()) {
        anyhow::bail!("not logged in or session expired; run `kpd3 login`");
    }
    ApiClient::new(config, session.token().map(str::to_string))
}

async fn load_snapshot(
    session: &mut Session,
    args: &SnapshotArgs,
    date: NaiveDate,
) -> anyhow::Result<Vec<IncidentRecord>> {
    if let Some(path) = &args.csv {
        return ingest::read_incident_csv(path);
    }

    let config = Config::from_env()?;
    let client = authed_client(&config, session)?;
    client
        .fetch_incidents(date)
        .await
        .map_err(|err| session.forced_logout(err))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kpd3=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut session = open_session()?;

    match cli.command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(value) => value,
                None => std::env::var("KPD3_PASSWORD")
                    .context("pass --password or set KPD3_PASSWORD")?,
            };
            let config = Config::from_env()?;
            let client = ApiClient::new(&config, None)?;
            let login = client.login(&username, &password).await?;
            if auth::is_expired(&login.access_token, Utc::now()) {
                warn!("server issued a token that is already expired or has no exp claim");
            }
            session.sign_in(&login.access_token, login.user)?;
            println!("Logged in as {username}.");
        }
        Commands::Logout => {
            session.logout()?;
            println!("Logged out.");
        }
        Commands::Status => {
            match session.token().and_then(auth::expires_at) {
                Some(expiry) => println!("Logged in; token expires {expiry}."),
                None => println!("Not logged in."),
            }
            if let Some(user) = session.user() {
                println!("User: {user}");
            }
            println!("Sidebar collapsed: {}", session.sidebar_collapsed());
        }
        Commands::Prefs { sidebar_collapsed } => {
            if let Some(collapsed) = sidebar_collapsed {
                session.set_sidebar_collapsed(collapsed)?;
            }
            println!("Sidebar collapsed: {}", session.sidebar_collapsed());
        }
        Commands::Aggregate {
            snapshot,
            top,
            json,
        } => {
            let date = snapshot.date.unwrap_or_else(|| Utc::now().date_naive());
            let weights = snapshot.weights.resolve()?;
            let records = load_snapshot(&mut session, &snapshot, date).await?;
            let aggregates = aggregate::compute_aggregates(&records, &weights);
            let filtered = aggregate::apply_district_filter(&aggregates, &snapshot.districts);

            if json {
                println!("{}", serde_json::to_string_pretty(&filtered)?);
            } else {
                report::print_summary(date, &snapshot.districts, &filtered, top);
            }
        }
        Commands::Export { snapshot, out } => {
            let date = snapshot.date.unwrap_or_else(|| Utc::now().date_naive());
            let weights = snapshot.weights.resolve()?;
            let records = load_snapshot(&mut session, &snapshot, date).await?;
            let aggregates = aggregate::compute_aggregates(&records, &weights);
            let filtered = aggregate::apply_district_filter(&aggregates, &snapshot.districts);

            let out = out.unwrap_or_else(|| PathBuf::from(export::export_filename(date)));
            std::fs::write(&out, export::export_to_csv(&filtered)?)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "Exported {} districts to {}.",
                filtered.severity_records.len(),
                out.display()
            );
        }
        Commands::Report {
            snapshot,
            top,
            out,
        } => {
            let date = snapshot.date.unwrap_or_else(|| Utc::now().date_naive());
            let weights = snapshot.weights.resolve()?;
            let records = load_snapshot(&mut session, &snapshot, date).await?;
            let aggregates = aggregate::compute_aggregates(&records, &weights);
            let filtered = aggregate::apply_district_filter(&aggregates, &snapshot.districts);

            let report = report::build_report(date, &snapshot.districts, &filtered, top);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Fetch { dataset } => {
            let config = Config::from_env()?;
            let client = authed_client(&config, &session)?;
            let items = client
                .fetch_dataset(dataset)
                .await
                .map_err(|err| session.forced_logout(err))?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Commands::Watch {
            date,
            districts,
            weights,
            interval_secs,
            top,
        } => {
            let weights = weights.resolve()?;
            let interval = Duration::from_secs(interval_secs.max(1));
            let mut config = Config::from_env()?;
            config.request_timeout.get_or_insert(interval);
            let client = authed_client(&config, &session)?;

            let options = WatchOptions {
                fixed_date: date,
                districts,
                weights,
                interval,
            };
            let shutdown = async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "failed to listen for ctrl-c");
                    std::future::pending::<()>().await;
                }
            };
            watch::watch(client, options, shutdown, |params, aggregates| {
                report::print_summary(params.date, &params.districts, aggregates, top)
            })
            .await
            .map_err(|err| match err.downcast::<ApiError>() {
                Ok(api_err) => session.forced_logout(api_err),
                Err(other) => other,
            })?;
        }
    }

    Ok(())
}
