//! laterald — Lateral cache peer discovery daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use lateral_core::config::LateralConfig;
use lateral_discovery::{
    DiscoveredService, DiscoveryListener, DiscoveryManager, ServiceKey, ShutdownHooks,
    TokioScheduler,
};

/// Logs every registry change.
struct LoggingListener;

impl DiscoveryListener for LoggingListener {
    fn on_peer_discovered_or_updated(&self, service: &DiscoveredService) {
        tracing::debug!(peer = %service, "peer seen");
    }

    fn on_peer_removed(&self, service: &DiscoveredService) {
        tracing::info!(peer = %service, "peer gone");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = LateralConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = LateralConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        LateralConfig::default()
    });

    let attributes = config
        .discovery
        .attributes()
        .context("invalid discovery configuration")?;
    tracing::info!(%attributes, regions = ?config.cache.regions, "laterald starting");

    // Shared state
    let manager = DiscoveryManager::new();
    let hooks = ShutdownHooks::new();
    let scheduler = TokioScheduler::current();

    let service = manager.get_or_create(&attributes, &config.cache.regions, &hooks, &scheduler);
    service.add_listener(Arc::new(LoggingListener));

    if !service.is_receiving() {
        tracing::warn!("discovery is inert: the multicast group could not be joined");
    }

    // ── Registry snapshots ───────────────────────────────────────────────────

    let registry_printer = {
        let service = service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let peers = service.discovered_peers();
                tracing::info!(
                    count = peers.len(),
                    received = service.message_count(),
                    "peer registry snapshot"
                );
                for peer in peers {
                    tracing::info!(
                        peer = %format!("{}:{}", peer.address, peer.port),
                        regions = ?peer.region_names,
                        "  peer"
                    );
                }
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r.context("failed to listen for ctrl-c")?;
            tracing::info!("shutdown signal received");
        }
        r = registry_printer => tracing::error!("registry printer exited: {:?}", r),
    }

    hooks.run();
    manager.shutdown_all();
    scheduler.shutdown();

    // Give the receive loop a moment to leave the group.
    tokio::time::sleep(Duration::from_millis(100)).await;
    tracing::info!(key = %ServiceKey::of(&attributes), "laterald stopped");

    Ok(())
}
