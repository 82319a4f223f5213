//! Discovery manager: at most one discovery service per network identity.
//!
//! Every region configured for lateral discovery asks the manager for a
//! service. Regions sharing a group and a local service port share one
//! service, and therefore one bound multicast socket.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;

use lateral_core::DiscoveryAttributes;

use crate::listener::{ShutdownObserver, ShutdownRegistry};
use crate::scheduler::Scheduler;
use crate::service::DiscoveryService;

/// Network identity of a discovery service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub group_addr: Ipv4Addr,
    pub group_port: u16,
    pub service_port: u16,
}

impl ServiceKey {
    pub fn of(attributes: &DiscoveryAttributes) -> Self {
        Self {
            group_addr: attributes.group_addr,
            group_port: attributes.group_port,
            service_port: attributes.service_port,
        }
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.group_addr, self.group_port, self.service_port
        )
    }
}

/// Process-wide table of discovery services. Construct one at startup and
/// pass it by reference.
#[derive(Default)]
pub struct DiscoveryManager {
    services: Mutex<HashMap<ServiceKey, Arc<DiscoveryService>>>,
}

impl DiscoveryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the service for `attributes`' key, creating and starting it if
    /// needed, and make sure it participates in `regions`.
    ///
    /// A new service gets its regions before its first advertisement or
    /// answer goes out. It is registered with `shutdown` and wired into
    /// `scheduler` before it is cached.
    ///
    /// Must be called from within a tokio runtime.
    pub fn get_or_create(
        &self,
        attributes: &DiscoveryAttributes,
        regions: &[String],
        shutdown: &dyn ShutdownRegistry,
        scheduler: &dyn Scheduler,
    ) -> Arc<DiscoveryService> {
        let key = ServiceKey::of(attributes);

        // Held across check-then-create: two callers must never both bind.
        let mut services = self.services.lock();
        if let Some(existing) = services.get(&key) {
            tracing::debug!(%key, "returning existing discovery service");
            for region in regions {
                existing.add_participating_region(region);
            }
            return existing.clone();
        }

        tracing::info!(%key, ?regions, "creating discovery service");
        let service = DiscoveryService::new(attributes.clone());
        for region in regions {
            service.add_participating_region(region);
        }
        shutdown.register_shutdown_observer(service.clone());
        service.wire_scheduler(scheduler);
        service.startup();

        services.insert(key, service.clone());
        service
    }

    pub fn get(&self, key: &ServiceKey) -> Option<Arc<DiscoveryService>> {
        self.services.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.services.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.lock().is_empty()
    }

    /// Shut down every service. Services stay in the table; shutdown is
    /// idempotent so a later observer call is harmless.
    pub fn shutdown_all(&self) {
        let services: Vec<_> = self.services.lock().values().cloned().collect();
        for service in services {
            service.shutdown();
        }
    }
}

/// Minimal shutdown registry: collects observers, runs them once.
#[derive(Default)]
pub struct ShutdownHooks {
    observers: Mutex<Vec<Arc<dyn ShutdownObserver>>>,
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }

    /// Notify every observer, in registration order, then forget them.
    pub fn run(&self) {
        let observers: Vec<_> = self.observers.lock().drain(..).collect();
        tracing::info!(count = observers.len(), "running shutdown observers");
        for observer in observers {
            observer.on_shutdown();
        }
    }
}

impl ShutdownRegistry for ShutdownHooks {
    fn register_shutdown_observer(&self, observer: Arc<dyn ShutdownObserver>) {
        self.observers.lock().push(observer);
    }
}
