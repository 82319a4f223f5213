//! Callbacks into the layer that routes cache traffic to peers.

use std::sync::Arc;

use crate::peer::DiscoveredService;

/// Receives peer registry changes.
///
/// Callbacks run on a dispatch worker or a scheduler task. They must not
/// block for long; the dispatch pool has two workers.
pub trait DiscoveryListener: Send + Sync {
    /// A peer was seen. Called on every passive broadcast from the peer,
    /// including ones that change nothing.
    fn on_peer_discovered_or_updated(&self, service: &DiscoveredService);

    /// A peer left or went silent. Called even if the peer was never known.
    fn on_peer_removed(&self, service: &DiscoveredService);
}

/// Something that must be told when the process shuts down.
pub trait ShutdownObserver: Send + Sync {
    fn on_shutdown(&self);
}

/// Collaborator that collects shutdown observers, typically owned by the
/// cache manager of the process.
pub trait ShutdownRegistry: Send + Sync {
    fn register_shutdown_observer(&self, observer: Arc<dyn ShutdownObserver>);
}

/// Pointer identity for trait objects. Compares data pointers only; vtable
/// pointers for the same type may differ between codegen units.
pub(crate) fn same_listener(a: &Arc<dyn DiscoveryListener>, b: &Arc<dyn DiscoveryListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
