//! Agent binary entry point.
//!
//! Loads configuration, spawns one pipeline worker per configured device,
//! and runs until the sources end or Ctrl+C. Real hub/store clients are
//! deployment-specific and wired by embedding the library; this binary
//! ships the simulator backend (`--simulate`) for local runs.

use std::sync::Arc;

use clap::Parser;
use telespool::config::{AppConfig, SinkMode};
use telespool::errorlog;
use telespool::pipeline::{Pipeline, SessionToken};
use telespool::source::{SimSource, SimSourceConfig, TelemetrySource};
use telespool::transport::{MemoryHub, MemoryStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Telespool - machine telemetry store-and-forward agent
#[derive(Parser, Debug)]
#[command(name = "telespool", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/telespool.yaml",
        env = "TELESPOOL_CONFIG"
    )]
    config: String,

    /// Delivery path override (hub or store)
    #[arg(long, env = "TELESPOOL_SINK")]
    sink: Option<SinkMode>,

    /// Run against the built-in simulator and in-memory transports
    #[arg(long)]
    simulate: bool,

    /// Stop each simulated stream after this many batches
    #[arg(long, env = "TELESPOOL_MAX_BATCHES")]
    max_batches: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,telespool=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            fail(&AppConfig::default(), &e);
            return;
        }
    };
    if let Some(sink) = cli.sink {
        config.sink = sink;
    }

    if let Err(e) = run(&config, &cli).await {
        fail(&config, e.as_ref());
    }
}

/// Surface a fatal startup failure and persist the error artifact.
fn fail(config: &AppConfig, error: &(dyn std::error::Error + 'static)) {
    tracing::error!(error = %error, "Fatal startup failure");
    match errorlog::write_error_artifact(&config.error_log_path, error) {
        Ok(path) => {
            tracing::error!("Error details have been written to: {}", path.display());
        }
        Err(io) => {
            tracing::warn!(error = %io, "Could not persist the error artifact");
        }
    }
    std::process::exit(1);
}

async fn run(config: &AppConfig, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.simulate {
        return Err(
            "no telemetry source backend configured: hub/store clients are \
             deployment-specific and wired by embedding the library; \
             run with --simulate for a local end-to-end exercise"
                .into(),
        );
    }

    tracing::info!(
        sink = %config.sink,
        devices = config.devices.len(),
        "Starting pipelines"
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, shutting down");
            signal_cancel.cancel();
        }
    });

    let settings = config.pipeline_settings();
    let hub = Arc::new(MemoryHub::with_auto_assign(&config.store.container));
    let store = Arc::new(MemoryStore::new());

    let mut workers = tokio::task::JoinSet::new();
    for device in &config.devices {
        let source = Arc::new(SimSource::new(SimSourceConfig {
            device: device.clone(),
            max_batches: cli.max_batches,
        }));

        // Skip devices the source is not serving; the others still run.
        let available = source.discover().await?;
        if !available.contains(device) {
            tracing::warn!(device = %device, "Source is not currently streaming this device");
            continue;
        }

        let session = SessionToken::start(device);
        tracing::info!(device = %device, session = %session, "Session opened");

        let pipeline = Pipeline::new(source, session, settings.clone(), cancel.child_token());
        match config.sink {
            SinkMode::Hub => {
                let hub = Arc::clone(&hub);
                workers.spawn(async move { pipeline.run_with_hub(hub).await });
            }
            SinkMode::Store => {
                let store = Arc::clone(&store);
                let container = config.store.container.clone();
                workers.spawn(async move { pipeline.run_with_store(store, &container).await });
            }
        }
    }

    if workers.is_empty() {
        return Err("no configured device is available from the source".into());
    }

    let mut failed = 0usize;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failed += 1;
                tracing::error!(error = %e, "Pipeline terminated with error");
            }
            Err(e) => {
                failed += 1;
                tracing::error!(error = %e, "Pipeline task panicked");
            }
        }
    }

    if failed > 0 {
        tracing::warn!(failed, "Some pipelines did not finish cleanly");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
