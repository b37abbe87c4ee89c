pub mod alerts;
pub mod bridge;
pub mod bridge_pending;
pub mod commands;
pub mod conformance;
pub mod db;
pub mod error;
pub mod events;
pub mod features;
pub mod health;
pub mod ingest;
pub mod jsonrpc;
pub mod migrations;
pub mod monitor;
pub mod query;
pub mod registry;
pub mod supervisor;
pub mod types;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::bridge::CollectorBridge;
use crate::commands::AppState;
use crate::conformance::Tr101290Policy;
use crate::db::DbPool;

pub const COLLECTOR_ENV: &str = "STREAMWATCH_COLLECTOR";

/// Initialize structured logging with tracing.
/// Respects RUST_LOG env var; defaults to `info` level for streamwatch crate.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("streamwatch=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Collector command line from the environment, split on whitespace.
fn collector_command() -> Vec<String> {
    std::env::var(COLLECTOR_ENV)
        .map(|cmd| cmd.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub fn run() {
    dotenvy::dotenv().ok();
    init_tracing();

    let data_dir = db::streamwatch_data_dir();
    let db_path = data_dir.join("state").join("streamwatch.sqlite");
    let pool = db::create_pool(&db_path).expect("Failed to create database pool");
    db::init_db(&pool).expect("Failed to initialize database");
    migrations::run_pending(&pool).expect("Failed to run migrations");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    if let Err(e) = runtime.block_on(serve(pool)) {
        error!(error = %e, "streamwatch stopped with an error");
        std::process::exit(1);
    }
}

/// Loads persisted state, starts every worker and the collector, then runs
/// until ctrl-c.
async fn serve(pool: DbPool) -> Result<(), Box<dyn std::error::Error>> {
    let settings = commands::config::load_monitor_config(&pool)?;
    let (telemetry_tx, telemetry_rx) = mpsc::channel(settings.queue_capacity.max(1));

    let mut state = AppState::new(pool, settings)?;
    state
        .notifier
        .replace_subscriptions(commands::webhooks::webhooks_list_db(&state.pool)?);

    let command = collector_command();
    if command.is_empty() {
        warn!("{COLLECTOR_ENV} not set, no telemetry will be collected");
    } else {
        let bridge = CollectorBridge::new(command, Arc::new(Tr101290Policy), telemetry_tx);
        state = state.with_collector(Arc::new(bridge));
    }

    // The collector is not running yet, so `start_monitoring` only records
    // each stream; `spawn` below announces all of them to the new process.
    let streams = commands::streams::streams_list_db(&state.pool)?;
    for stream in &streams {
        state.registry.add_stream(stream.clone())?;
        if !stream.enabled {
            continue;
        }
        if let Some(collector) = &state.collector {
            collector.start_monitoring(stream).await?;
        }
    }

    let forwarder = tokio::spawn(state.registry.clone().forward(telemetry_rx));

    if let Some(collector) = &state.collector {
        if let Err(e) = collector.spawn() {
            error!(error = %e, "collector failed to start");
        }
    }
    info!(streams = streams.len(), "streamwatch running");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Some(collector) = &state.collector {
        if let Err(e) = collector.kill() {
            warn!(error = %e, "collector did not stop cleanly");
        }
    }
    state.registry.shutdown_all().await;
    forwarder.abort();
    Ok(())
}
