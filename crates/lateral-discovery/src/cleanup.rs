//! Idle peer reaping.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::peer::{now_millis, DiscoveredService};
use crate::registry::SharedRegistry;
use crate::scheduler::PeriodicTask;

/// Removes peers that have been silent for longer than the idle threshold.
///
/// Eligibility is strictly greater than the threshold; a peer idle for
/// exactly `max_idle` survives the sweep. A peer refreshed between the
/// snapshot and its removal is kept.
pub struct CleanupRunner {
    registry: SharedRegistry,
    max_idle_millis: u64,
    stopped: AtomicBool,
}

impl CleanupRunner {
    pub fn new(registry: SharedRegistry, max_idle_secs: u64) -> Self {
        Self {
            registry,
            max_idle_millis: max_idle_secs.saturating_mul(1000),
            stopped: AtomicBool::new(false),
        }
    }

    /// Make every later tick a no-op.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Sweep as of `now` (milliseconds since the Unix epoch). Returns the
    /// number of peers removed.
    pub fn run_at(&self, now: u64) -> usize {
        // Mark first, then remove: never mutate the map while iterating it.
        let stale: Vec<DiscoveredService> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|peer| peer.idle_millis(now) > self.max_idle_millis)
            .collect();

        for peer in &stale {
            tracing::info!(
                peer = %peer,
                idle_ms = peer.idle_millis(now),
                max_idle_ms = self.max_idle_millis,
                "lateral peer idle too long, removing"
            );
        }
        stale
            .iter()
            .filter(|peer| self.registry.remove_unrefreshed(peer))
            .count()
    }
}

impl PeriodicTask for CleanupRunner {
    fn name(&self) -> &'static str {
        "discovery-cleanup"
    }

    fn run(&self) {
        if self.is_stopped() {
            return;
        }
        let removed = self.run_at(now_millis());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.registry.len(), "cleanup sweep done");
        }
    }
}
