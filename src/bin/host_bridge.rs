//! Headless engine host for stdin/stdout JSON communication.
//!
//! Reads `CommandEnvelope` messages as newline-delimited JSON from stdin,
//! dispatches them to the reminder engine and the sync scheduler, and
//! writes `ResponseEnvelope` and `EventEnvelope` messages to stdout.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use calminder::config::CalminderConfig;
use calminder::host::stdio::run_stdio_bridge;
use calminder::store::MemoryEventStore;
use calminder::sync::{FeedSourceSyncer, HttpFeedFetcher, JsonFeedParser};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = CalminderConfig::default_config_path();
    let config = CalminderConfig::load_or_default(&config_path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", config_path.display()))?;

    tracing::info!(config = %config_path.display(), "calminder-host starting");

    let syncer = FeedSourceSyncer::new(
        Arc::new(HttpFeedFetcher::new(&config.sync)),
        Arc::new(JsonFeedParser),
        Arc::new(MemoryEventStore::new()),
    );

    run_stdio_bridge(config, Arc::new(syncer))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "calminder-host exited with error");
            anyhow::anyhow!("calminder-host failed: {e}")
        })?;

    tracing::info!("calminder-host shut down cleanly");
    Ok(())
}
