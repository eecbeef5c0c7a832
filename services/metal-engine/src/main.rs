//! Metal Engine Service
//!
//! Boots the nano execution engine:
//! - Tracing and configuration
//! - Engine loop on a dedicated thread
//! - Optional frame-file replay
//! - Ctrl-C stops the loop and the final counters are logged

use anyhow::{Context, Result};
use clap::Parser;
use metal_engine::supervisor::feed_and_stop;
use metal_engine::{Pipeline, ServiceConfig};
use std::path::PathBuf;
use std::thread;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "metal-engine";

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = SERVICE_NAME, version, about = "Nano execution engine host")]
struct Args {
    /// JSON config file, overrides METAL_ENGINE_CONFIG
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recorded frame file to feed through the pipeline, then exit
    #[arg(short, long)]
    replay: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let args = Args::parse();
    info!("Starting {} v{}", SERVICE_NAME, env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::load(args.config.as_deref()).context("Configuration rejected")?;
    info!(
        engine = %config.engine.name,
        session = %config.engine.session,
        overrides = config.limits.per_instrument.len(),
        "Configuration loaded"
    );

    let mut pipeline = Pipeline::launch(&config)?;
    let stop = pipeline.stop_handle();

    let feeder = match args.replay {
        Some(path) => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read replay file {}", path.display()))?;
            let mut inbound = pipeline
                .take_inbound()
                .context("Ingestion ring already claimed")?;
            let (stop, counters) = (pipeline.stop_handle(), pipeline.counters());
            info!(path = %path.display(), bytes = bytes.len(), "Replaying frames");
            Some(
                thread::Builder::new()
                    .name("replay-feeder".to_string())
                    .spawn(move || feed_and_stop(&mut inbound, &bytes, &stop, &counters))
                    .context("Failed to spawn replay feeder")?,
            )
        }
        None => None,
    };

    let mut join = tokio::task::spawn_blocking(move || pipeline.join());
    let summary = tokio::select! {
        outcome = &mut join => outcome??,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Received Ctrl-C, stopping engine");
            stop.stop();
            join.await??
        }
    };

    if let Some(feeder) = feeder {
        match feeder.join() {
            Ok(fed) => info!(frames = fed, "Replay feeder finished"),
            Err(_) => warn!("Replay feeder panicked"),
        }
    }

    info!(
        summary = %serde_json::to_string(&summary)?,
        "{} shut down", SERVICE_NAME
    );
    Ok(())
}

/// Initialize tracing
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}=info,nano_engine=info,bus=info",
                    SERVICE_NAME.replace('-', "_")
                )
                .into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    Ok(())
}
