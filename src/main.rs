//! STM bus proximity tracker
//!
//! Polls the Montevideo transit API and reports monitored-line buses
//! passing within a threshold of one configured stop.
//!
//! Module structure:
//! - `domain/` - Core business types (positions, stops, passage events)
//! - `io/` - External interfaces (file store, store writer channel)
//! - `services/` - Business logic (Tracker, TokenManager, PositionFetcher)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use stm_tracker::domain::types::MonitoredStop;
use stm_tracker::infra::{Config, Metrics};
use stm_tracker::io::{create_store_channel, run_store_writer, FileStore, PassageStore};
use stm_tracker::services::{PositionFetcher, TokenManager, Tracker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// STM tracker - reports buses approaching a monitored stop
#[derive(Parser, Debug)]
#[command(name = "stm-tracker", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Print every line variant the API knows about and exit
    #[arg(long)]
    list_variants: bool,
}

/// The gateway rejects requests from unknown user agents
const USER_AGENT: &str = "PostmanRuntime/7.50.0";

/// Queue depth between the tracker and the store writer
const STORE_QUEUE_SIZE: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("stm-tracker starting");

    let args = Args::parse();
    let config = Config::load(args.config.as_deref());
    config.validate()?;

    info!(
        config_file = %config.config_file(),
        api_base_url = %config.api_base_url(),
        stop_id = %config.stop_id(),
        lines = %config.lines().join(","),
        line_variant_ids = %config.line_variant_ids().join(","),
        threshold_m = %config.proximity_threshold_meters(),
        poll_interval_s = %config.poll_interval_secs(),
        cooldown_min = %config.cooldown_minutes(),
        data_dir = %config.data_dir(),
        "config_loaded"
    );

    // One HTTP client for auth and data calls so the session cookie set by
    // the token endpoint rides along on the data calls
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs()))
        .user_agent(USER_AGENT)
        .cookie_store(true)
        .build()?;

    let metrics = Arc::new(Metrics::new());
    let mut auth = TokenManager::new(client.clone(), &config, Arc::clone(&metrics));
    let fetcher = PositionFetcher::new(client, &config);

    // Prove the credentials up front; a bad secret fails the process here,
    // not the first poll cycle
    let token = auth.ensure_valid_token().await?;

    if args.list_variants {
        return list_variants(&fetcher, token.value()).await;
    }

    let store = FileStore::new(config.data_dir());
    let stop = resolve_stop(&store, &fetcher, token.value(), config.stop_id()).await?;

    let (store_sender, store_rx) = create_store_channel(STORE_QUEUE_SIZE, stop.external_id);
    let writer = tokio::spawn(run_store_writer(store, store_rx, Arc::clone(&metrics)));

    // Handle shutdown on Ctrl+C
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run the poll loop until shutdown
    let mut tracker = Tracker::new(config, stop, auth, fetcher, store_sender, metrics);
    tracker.run(shutdown_rx).await;

    // Dropping the tracker closes the store channel; wait for queued
    // passages to reach disk
    drop(tracker);
    writer.await?;

    info!("stm-tracker shutdown complete");
    Ok(())
}

/// Stop cache first, then the full directory scan. Startup fails if the
/// stop cannot be resolved either way.
async fn resolve_stop(
    store: &FileStore,
    fetcher: &PositionFetcher,
    token: &str,
    stop_id: i64,
) -> Result<MonitoredStop, Box<dyn std::error::Error>> {
    if let Some(stop) = store.find_stop(stop_id).await? {
        info!(stop_id = %stop_id, label = %stop.label, source = "cache", "stop_resolved");
        return Ok(stop);
    }

    let stop = fetcher
        .find_stop(token, stop_id)
        .await?
        .ok_or_else(|| format!("stop {} not found in the stop directory", stop_id))?;

    // A failed cache write is only an inconvenience on the next start
    if let Err(e) = store.save_stop(&stop).await {
        warn!(stop_id = %stop_id, error = %e, "stop_cache_write_failed");
    }

    info!(stop_id = %stop_id, label = %stop.label, source = "api", "stop_resolved");
    Ok(stop)
}

/// Print the line variant directory, for picking line_variant_ids values
/// for the config file.
async fn list_variants(
    fetcher: &PositionFetcher,
    token: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut variants = fetcher.fetch_line_variants(token).await?;
    variants.sort_by(|a, b| a.line.cmp(&b.line).then(a.line_variant_id.cmp(&b.line_variant_id)));

    println!("{:>10}  {:>5}  {:>4}  route", "variant", "line", "sub");
    for variant in &variants {
        println!(
            "{:>10}  {:>5}  {:>4}  {} -> {}",
            variant.line_variant_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            variant.line.as_deref().unwrap_or("-"),
            variant.subline.as_deref().unwrap_or("-"),
            variant.origin.as_deref().unwrap_or("?"),
            variant.destination.as_deref().unwrap_or("?"),
        );
    }

    info!(variants = %variants.len(), "line_variants_listed");
    Ok(())
}
