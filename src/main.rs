//! CLI entry point for the bus arrival tracker.
//!
//! Provides subcommands for running the position poller, showing a bus
//! dashboard, listing buses for a trip and listing stops.

use anyhow::{Context, Result, bail};
use bus_eta::config::TelemetryConfig;
use bus_eta::matcher::{GEOFENCE_KM, StopMatcher};
use bus_eta::model::BusId;
use bus_eta::output::print_json;
use bus_eta::poller::{PollPolicy, Poller};
use bus_eta::store::{MemoryStore, Network, Store};
use bus_eta::tracker::Tracker;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bus_eta")]
#[command(about = "Track a bus along its route and estimate arrival times", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// JSON file with stops, routes and buses
    #[arg(long, default_value = "data/network.json")]
    network: String,

    /// CSV log of position samples (read on startup, appended while tracking)
    #[arg(long, default_value = "data/samples.csv")]
    sample_log: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll telemetry and keep the bus's current stop up to date until Ctrl+C
    Track {
        #[command(flatten)]
        data: DataArgs,

        /// Bus that the telemetry feed belongs to
        #[arg(short, long, default_value = "101")]
        bus: String,

        /// Seconds between polls
        #[arg(short = 'i', long, default_value_t = 5)]
        interval_secs: u64,

        /// Longest wait between polls after repeated failures
        #[arg(long, default_value_t = 5)]
        max_backoff_secs: u64,

        /// Per-request timeout for the telemetry fetch
        #[arg(long, default_value_t = 10)]
        fetch_timeout_secs: u64,

        /// Radius around a stop within which the bus counts as being there
        #[arg(long, default_value_t = GEOFENCE_KM)]
        geofence_km: f64,
    },
    /// Show a bus's position along its route, optionally with an ETA to a stop
    Dashboard {
        #[command(flatten)]
        data: DataArgs,

        #[arg(short, long)]
        bus: String,

        /// Stop to estimate arrival at
        #[arg(short, long)]
        stop: Option<String>,
    },
    /// List buses travelling from one stop to another
    Available {
        #[command(flatten)]
        data: DataArgs,

        #[arg(short, long)]
        start: String,

        #[arg(short, long)]
        end: String,
    },
    /// List all stop names
    Stops {
        #[command(flatten)]
        data: DataArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bus_eta.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bus_eta.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track {
            data,
            bus,
            interval_secs,
            max_backoff_secs,
            fetch_timeout_secs,
            geofence_km,
        } => {
            let policy = PollPolicy {
                interval: Duration::from_secs(interval_secs),
                max_backoff: Duration::from_secs(max_backoff_secs.max(interval_secs)),
            };
            track(
                &data,
                BusId::new(bus),
                policy,
                Duration::from_secs(fetch_timeout_secs),
                geofence_km,
            )
            .await?;
        }
        Commands::Dashboard { data, bus, stop } => {
            let tracker = Tracker::new(Arc::new(open_store(&data, &StopMatcher::default())?));
            let view = tracker.dashboard(&BusId::new(bus), stop.as_deref())?;
            print_json(&view)?;
        }
        Commands::Available { data, start, end } => {
            let tracker = Tracker::new(Arc::new(open_store(&data, &StopMatcher::default())?));
            let buses = tracker.available_buses(&start, &end)?;
            info!(count = buses.len(), start = %start, end = %end, "Available buses");
            print_json(&buses)?;
        }
        Commands::Stops { data } => {
            let tracker = Tracker::new(Arc::new(open_store(&data, &StopMatcher::default())?));
            print_json(&tracker.stop_names()?)?;
        }
    }

    Ok(())
}

/// Loads the network, then restores each bus's last snapped stop from the
/// sample log.
fn open_store(data: &DataArgs, matcher: &StopMatcher) -> Result<MemoryStore> {
    let network = Network::load(&data.network)?;
    let store = MemoryStore::from_network(&network)?;

    let loaded = store.load_sample_log(&data.sample_log)?;
    if loaded > 0 {
        for bus in store.buses()? {
            matcher.replay(&store, &bus.id)?;
        }
    }
    info!(samples = loaded, path = %data.sample_log.display(), "Sample log loaded");

    Ok(store)
}

/// Runs the poller for `bus` until Ctrl+C, then logs its statistics.
#[tracing::instrument(skip(data, policy, fetch_timeout), fields(network = %data.network))]
async fn track(
    data: &DataArgs,
    bus: BusId,
    policy: PollPolicy,
    fetch_timeout: Duration,
    geofence_km: f64,
) -> Result<()> {
    if geofence_km.is_nan() || geofence_km <= 0.0 {
        bail!("--geofence-km must be positive");
    }
    let matcher = StopMatcher::with_radius_km(geofence_km);

    let telemetry = TelemetryConfig::from_env()?;
    let source = telemetry.source(fetch_timeout)?;

    if let Some(dir) = data.sample_log.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let store = open_store(data, &matcher)?.with_sample_log(&data.sample_log);
    if store.bus(&bus)?.is_none() {
        warn!(bus = %bus, "Tracked bus is not in the network; every tick will fail");
    }
    let store = Arc::new(store);

    info!(url = %source.url(), "Polling telemetry. Press Ctrl+C to stop.");
    let handle = Poller::new(source, store, bus)
        .with_policy(policy)
        .with_matcher(matcher)
        .spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Shutdown requested");

    let stats = handle.shutdown().await?;
    print_json(&stats)?;
    Ok(())
}
