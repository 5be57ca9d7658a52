//! Su Squares Listener - Entry Point
//!
//! Watches one network's Su Squares contracts and triggers asset
//! regeneration once events are buried under enough blocks. Runs until
//! SIGINT.
//!
//! Wiring sequence:
//! 1. Load configuration from the environment + validate
//! 2. Init tracing (pretty or JSON)
//! 3. Load deployment records for `NETWORK`
//! 4. Connect the WebSocket provider (liveness check, chain id check)
//! 5. Spawn health/metrics server if `METRICS_ADDR` is set
//! 6. Build the asset updater and file repository
//! 7. Open the live subscriptions (buffered until catch-up is done)
//! 8. Startup + CatchUp phases
//! 9. Live phase until SIGINT

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use su_squares_listener::adapters::chain::{
    ChainLogSource, ChainProvider, ContractSet, DeploymentBook, LiveFeed, abort_all, open_live_feed,
};
use su_squares_listener::adapters::metrics::{
    HealthServer, HealthState, ListenerMetrics, MetricsTelemetry,
};
use su_squares_listener::adapters::persistence::FileRepository;
use su_squares_listener::adapters::updater::ConfiguredUpdater;
use su_squares_listener::config::{LogConfig, LogFormat, loader};
use su_squares_listener::error::ListenerError;
use su_squares_listener::ports::{AssetUpdater, Repository};
use su_squares_listener::usecases::{ChunkOptions, ListenerPipeline, PipelineOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // ── 1. Load configuration from the environment ──────────
    let config = loader::load_config().context("Failed to load configuration")?;

    // ── 2. Initialize logging ───────────────────────────────
    init_tracing(&config.log);

    let network = config.network.name.clone();
    info!(
        network = %network,
        version = env!("CARGO_PKG_VERSION"),
        required_confirmations = config.network.required_confirmations,
        poll_interval_ms = config.network.poll_interval_ms,
        "Starting Su Squares listener"
    );

    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 3. Deployment records ───────────────────────────────
    let book = DeploymentBook::load(&config.deployments_dir, &network)
        .context("Failed to load deployment records")?;

    // ── 4. Provider ─────────────────────────────────────────
    let provider = ChainProvider::connect(&config.network)
        .await
        .context("Failed to connect to chain RPC")?;

    if let Some(expected) = book.chain_id() {
        if expected != provider.chain_id() {
            return Err(ListenerError::config(format!(
                "{} deployment records are for chain {expected}, RPC serves chain {}",
                book.network(),
                provider.chain_id()
            ))
            .into());
        }
    }
    let contracts = ContractSet::from_book(&book);

    // ── 5. Health/metrics server ────────────────────────────
    let metrics = Arc::new(ListenerMetrics::new().context("Failed to register metrics")?);
    let health = HealthState::new();
    let health_handle = config.metrics_addr.clone().map(|addr| {
        let server = HealthServer::new(health.clone(), Arc::clone(&metrics), addr);
        let server_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = server.run(server_shutdown).await {
                error!(error = %e, "Health server failed");
            }
        })
    });

    // ── 6. Updater + repository ─────────────────────────────
    let updater = ConfiguredUpdater::from_config(&config.updater, &network)
        .context("Failed to build asset updater")?;
    let repo = FileRepository::from_data_dir(&config.data_dir);
    if !repo.is_healthy().await {
        return Err(ListenerError::config(format!(
            "data directory {} is not writable",
            config.data_dir.display()
        ))
        .into());
    }
    info!(updater = updater.name(), data_dir = %config.data_dir.display(), "Downstream wiring ready");

    // ── 7. Live feed, opened before catch-up ────────────────
    let LiveFeed { receiver, tasks } = open_live_feed(&provider.inner(), &contracts).await?;

    // ── 8. Startup + CatchUp ────────────────────────────────
    let fallback_start = config
        .network
        .start_block
        .or_else(|| book.earliest_block())
        .unwrap_or(0);
    let options = PipelineOptions {
        poll_interval: config.network.poll_interval(),
        chunk: ChunkOptions::from(&config.chunk),
        fallback_start,
    };
    let settings = config.queue.settings(config.network.required_confirmations);
    let source = ChainLogSource::new(provider.inner(), contracts);
    let telemetry = MetricsTelemetry::new(Arc::clone(&metrics), health.clone());

    let mut pipeline =
        ListenerPipeline::start(&network, source, updater, repo, telemetry, settings, options).await?;
    let report = pipeline.catch_up().await?;
    info!(
        from = report.from,
        to = report.to,
        fetched = report.fetched,
        tracked = report.tracked,
        dispatched = report.tick.dispatched,
        checkpoint = ?report.tick.status.checkpoint,
        "Catch-up finished, going live"
    );

    // ── 9. Live until SIGINT ────────────────────────────────
    let run = pipeline.run(receiver, shutdown_tx.subscribe());
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result?,
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating shutdown");
            let _ = shutdown_tx.send(());
            run.await?;
        }
    }

    let _ = shutdown_tx.send(());
    abort_all(&tasks);
    if let Some(handle) = health_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over `LOG_LEVEL`.
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.with_ansi(true).with_target(false).init(),
    }
}
