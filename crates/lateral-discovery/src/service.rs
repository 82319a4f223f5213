//! Discovery service: one node's view of its lateral peers.
//!
//! Owns the receiver, the advertise task and the peer registry, and hooks
//! the periodic work into a scheduler supplied by the cache process.
//! Transport setup failures are logged and leave the service inert rather
//! than failing construction: a cache without peers still serves locally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use lateral_core::net::local_host_address;
use lateral_core::{requester_id, DiscoveryAttributes};

use crate::cleanup::CleanupRunner;
use crate::listener::{DiscoveryListener, ShutdownObserver};
use crate::peer::DiscoveredService;
use crate::receiver::{MessageHandler, Receiver};
use crate::registry::{PeerRegistry, SharedRegistry};
use crate::scheduler::Scheduler;
use crate::sender::Sender;
use crate::sender_task::SenderTask;

pub struct DiscoveryService {
    attributes: DiscoveryAttributes,
    requester_id: u64,
    registry: SharedRegistry,
    sender_task: Arc<SenderTask>,
    cleanup: Arc<CleanupRunner>,
    /// `None` if the group could not be joined.
    receiver: Option<Arc<Receiver>>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl DiscoveryService {
    /// Create a service for this process. Sends one request broadcast.
    pub fn new(attributes: DiscoveryAttributes) -> Arc<Self> {
        Self::with_requester_id(attributes, requester_id())
    }

    /// Create a service that stamps and filters on `requester_id` instead of
    /// the process id. Lets several logical nodes share one process.
    pub fn with_requester_id(mut attributes: DiscoveryAttributes, requester_id: u64) -> Arc<Self> {
        if attributes.service_address.is_empty() {
            match local_host_address(attributes.group()) {
                Ok(addr) => attributes.service_address = addr.to_string(),
                Err(e) => tracing::error!(
                    error = %e,
                    "could not resolve local host address, peers will ignore our broadcasts"
                ),
            }
        }

        let receiver = match Receiver::for_attributes(&attributes) {
            Ok(r) => Some(Arc::new(r)),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    group = %attributes.group(),
                    "failed to create discovery receiver, other caches will not be found"
                );
                None
            }
        };

        let registry = PeerRegistry::shared();
        let sender_task = Arc::new(SenderTask::new(
            attributes.clone(),
            registry.regions(),
            requester_id,
        ));
        let cleanup = Arc::new(CleanupRunner::new(registry.clone(), attributes.max_idle_secs));

        tracing::info!(%attributes, requester_id, "discovery service created");

        Arc::new(Self {
            attributes,
            requester_id,
            registry,
            sender_task,
            cleanup,
            receiver,
            receive_task: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Start reading discovery datagrams.
    ///
    /// Must be called from within a tokio runtime. Does nothing if the
    /// service is shut down, has no receiver, or is already started.
    pub fn startup(self: &Arc<Self>) {
        if self.is_shutdown() {
            tracing::debug!("startup after shutdown ignored");
            return;
        }
        let Some(receiver) = self.receiver.clone() else {
            tracing::warn!("discovery receiver unavailable, not starting");
            return;
        };

        let mut task = self.receive_task.lock();
        if task.is_some() {
            tracing::debug!("discovery receiver already started");
            return;
        }

        let handler = Arc::new(MessageHandler::new(Arc::downgrade(self), self.requester_id));
        *task = Some(tokio::spawn(async move {
            if let Err(e) = receiver.run(handler).await {
                tracing::error!(error = %e, "discovery receiver exited");
            }
        }));
    }

    /// Register the advertise and cleanup tasks on `scheduler`.
    ///
    /// The cleanup period equals the idle threshold, so a silent peer may
    /// linger for up to twice `max_idle_secs`. Both tasks go quiet on
    /// `shutdown`, whether or not the scheduler keeps running.
    pub fn wire_scheduler(&self, scheduler: &dyn Scheduler) {
        scheduler.schedule_at_fixed_rate(
            self.sender_task.clone(),
            Duration::ZERO,
            self.attributes.advertise_interval,
        );
        scheduler.schedule_at_fixed_rate(
            self.cleanup.clone(),
            Duration::ZERO,
            self.attributes.cleanup_period(),
        );
    }

    /// Advertise `name` as a region this node serves, from the next tick on.
    pub fn add_participating_region(&self, name: &str) {
        let regions = self.registry.add_region(name);
        self.sender_task.set_region_names(regions);
    }

    pub fn participating_regions(&self) -> Vec<String> {
        self.registry.regions()
    }

    /// Record a passive broadcast from a peer and notify listeners.
    pub fn add_or_update_peer(&self, candidate: DiscoveredService) {
        self.registry.add_or_update(candidate);
    }

    /// Forget a peer and notify listeners, known or not.
    pub fn remove_peer(&self, candidate: &DiscoveredService) -> bool {
        self.registry.remove(candidate)
    }

    pub fn add_listener(&self, listener: Arc<dyn DiscoveryListener>) -> bool {
        self.registry.add_listener(listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn DiscoveryListener>) -> bool {
        self.registry.remove_listener(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.registry.listener_count()
    }

    /// Answer a peer's request broadcast with one passive broadcast.
    /// Failures are logged; the next advertise tick retries anyway.
    pub fn service_request_broadcast(&self) {
        let result = Sender::for_attributes(&self.attributes).and_then(|sender| {
            sender.with_requester_id(self.requester_id).passive_broadcast(
                &self.attributes.service_address,
                self.attributes.service_port,
                &self.participating_regions(),
                None,
            )
        });

        match result {
            Ok(()) => tracing::debug!("issued passive broadcast in answer to request"),
            Err(e) => tracing::error!(
                error = %e,
                group = %self.attributes.group(),
                "failed to answer request broadcast"
            ),
        }
    }

    /// Stop receiving and announce our departure. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            tracing::debug!("discovery shutdown already called");
            return;
        }

        tracing::info!(group = %self.attributes.group(), "shutting down discovery receiver");
        if let Some(receiver) = &self.receiver {
            receiver.shutdown();
        }

        self.cleanup.stop();
        tracing::info!(group = %self.attributes.group(), "shutting down discovery sender");
        self.sender_task.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Snapshot of every known peer.
    pub fn discovered_peers(&self) -> Vec<DiscoveredService> {
        self.registry.snapshot()
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn attributes(&self) -> &DiscoveryAttributes {
        &self.attributes
    }

    pub fn requester_id(&self) -> u64 {
        self.requester_id
    }

    /// False if the group could not be joined.
    pub fn is_receiving(&self) -> bool {
        self.receiver.as_ref().is_some_and(|r| !r.is_stopped())
    }

    /// Datagrams received so far. Zero if the group could not be joined.
    pub fn message_count(&self) -> u64 {
        self.receiver.as_ref().map_or(0, |r| r.message_count())
    }
}

impl ShutdownObserver for DiscoveryService {
    fn on_shutdown(&self) {
        self.shutdown();
    }
}

impl Drop for DiscoveryService {
    /// Dropped without `shutdown`: stop the receive loop and leave the
    /// group, but send no remove broadcast.
    fn drop(&mut self) {
        if let Some(receiver) = &self.receiver {
            receiver.shutdown();
        }
        self.cleanup.stop();
    }
}
