//! Peer registry: what this node knows about its lateral peers.
//!
//! Three pieces of shared state live here:
//! - the discovered peers, keyed on `(address, port)`
//! - the regions this node itself participates in
//! - the listeners to notify when the peer set changes
//!
//! Upserts and removals for one peer run under that peer's dashmap entry
//! lock, so two dispatch workers refreshing the same peer cannot interleave
//! their check-compare-replace. Listener fan-out always runs on a snapshot,
//! after the entry lock is released, so a listener may add or remove
//! listeners from inside its callback.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::listener::{same_listener, DiscoveryListener};
use crate::peer::{DiscoveredService, PeerKey};

#[derive(Default)]
pub struct PeerRegistry {
    peers: DashMap<PeerKey, DiscoveredService>,
    regions: RwLock<Vec<String>>,
    listeners: RwLock<Vec<Arc<dyn DiscoveryListener>>>,
}

/// Shared handle, as passed to receive workers and periodic tasks.
pub type SharedRegistry = Arc<PeerRegistry>;

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(Self::new())
    }

    // ── Peers ────────────────────────────────────────────────────────────────

    /// Insert a newly seen peer or replace the stored observation of a known
    /// one, then notify every listener.
    pub fn add_or_update(&self, candidate: DiscoveredService) {
        match self.peers.entry(candidate.key()) {
            Entry::Vacant(slot) => {
                tracing::info!(peer = %candidate, "discovered new lateral peer");
                slot.insert(candidate.clone());
            }
            Entry::Occupied(mut slot) => {
                if slot.get().region_names != candidate.region_names {
                    tracing::info!(
                        peer = %candidate,
                        previous = ?slot.get().region_names,
                        "region list changed for lateral peer"
                    );
                } else {
                    tracing::debug!(peer = %candidate, "refreshed lateral peer");
                }
                slot.insert(candidate.clone());
            }
        }

        for listener in self.listeners() {
            listener.on_peer_discovered_or_updated(&candidate);
        }
    }

    /// Remove a peer if present, then notify every listener regardless.
    /// Returns true if the peer was known.
    pub fn remove(&self, candidate: &DiscoveredService) -> bool {
        let removed = self.peers.remove(&candidate.key()).is_some();
        if removed {
            tracing::info!(peer = %candidate, "removed lateral peer");
        }

        for listener in self.listeners() {
            listener.on_peer_removed(candidate);
        }
        removed
    }

    /// Remove a peer only if it has not been heard from since `stale` was
    /// observed, then notify listeners if it was removed.
    pub fn remove_unrefreshed(&self, stale: &DiscoveredService) -> bool {
        let removed = self
            .peers
            .remove_if(&stale.key(), |_, current| {
                current.last_heard_from == stale.last_heard_from
            })
            .is_some();
        if !removed {
            tracing::debug!(peer = %stale, "peer refreshed before eviction, keeping it");
            return false;
        }

        tracing::info!(peer = %stale, "removed lateral peer");
        for listener in self.listeners() {
            listener.on_peer_removed(stale);
        }
        true
    }

    /// Copy of the stored entry for a peer.
    pub fn get(&self, key: &PeerKey) -> Option<DiscoveredService> {
        self.peers.get(key).map(|e| e.value().clone())
    }

    pub fn contains(&self, key: &PeerKey) -> bool {
        self.peers.contains_key(key)
    }

    /// Copy of every known peer. Safe to hold while the registry changes.
    pub fn snapshot(&self) -> Vec<DiscoveredService> {
        self.peers.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    // ── Local regions ────────────────────────────────────────────────────────

    /// Add a region this node serves. Returns the updated list, in the order
    /// regions were first added.
    pub fn add_region(&self, name: &str) -> Vec<String> {
        let mut regions = self.regions.write();
        if !regions.iter().any(|r| r == name) {
            regions.push(name.to_string());
        }
        regions.clone()
    }

    pub fn regions(&self) -> Vec<String> {
        self.regions.read().clone()
    }

    // ── Listeners ────────────────────────────────────────────────────────────

    /// Returns false if the listener was already registered.
    pub fn add_listener(&self, listener: Arc<dyn DiscoveryListener>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Returns false if the listener was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn DiscoveryListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    /// Snapshot of the listener set.
    pub fn listeners(&self) -> Vec<Arc<dyn DiscoveryListener>> {
        self.listeners.read().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}
