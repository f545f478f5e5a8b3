//! peerlogd — feeds packet events through the identity registry and packet log.
//!
//! Reads one JSON event per line from stdin (see `event.rs`), resolves the
//! sender, and appends a line to the packet log. Runs until stdin closes or
//! Ctrl-C.

use std::time::Duration;

use anyhow::{Context, Result};

use peerlog_core::config::PeerlogConfig;
use peerlog_services::{IdentityRegistry, LoggerConfig, PacketIngress, PacketLogger};

mod event;
mod feed;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = PeerlogConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = PeerlogConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PeerlogConfig::default()
    });
    tracing::info!(
        max_slots = config.registry.max_slots,
        logging = config.logging.enabled,
        "peerlogd starting"
    );

    let registry = IdentityRegistry::shared(config.registry.max_slots);
    let logger = PacketLogger::shared(LoggerConfig::from(&config.logging));
    if config.logging.enabled {
        // A missing log file is acceptable; keep running without one.
        if let Err(e) = logger.start_log(config.logging.file_prefix()) {
            tracing::warn!(error = %e, "continuing without packet log");
        }
    }
    let ingress = PacketIngress::new(registry.clone(), logger.clone());

    let stats_printer = {
        let logger = logger.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            loop {
                interval.tick().await;
                let stats = logger.stats();
                tracing::info!(
                    peers = registry.len(),
                    lines = stats.lines_written,
                    filtered = stats.filtered,
                    open_failures = stats.open_failures,
                    write_failures = stats.write_failures,
                    "packet log stats"
                );
            }
        })
    };

    let lines = feed::spawn_line_reader(std::io::BufReader::new(std::io::stdin()))?;
    let mut feed = tokio::spawn(feed::run_feed(lines, ingress));

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r.context("failed to listen for ctrl-c")?;
            tracing::info!("shutdown signal received");
            feed.abort();
        }
        r = &mut feed => {
            r.context("feed task panicked")??;
            tracing::info!("input closed");
        }
    }

    stats_printer.abort();
    logger.shutdown();
    for (slot, peer) in registry.snapshot() {
        tracing::debug!(slot, peer = %peer, "peer at shutdown");
    }
    Ok(())
}
