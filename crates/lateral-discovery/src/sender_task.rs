//! Periodic advertisement of this node.
//!
//! Each tick opens a new sender, broadcasts one passive message, and drops
//! the sender. Creating the task broadcasts a request so the new node learns
//! of its peers without waiting for their next tick; shutting it down
//! broadcasts a remove so peers evict us without waiting for their sweep.
//! Once shut down the task stays silent, even if the scheduler keeps
//! ticking it.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use lateral_core::DiscoveryAttributes;

use crate::error::DiscoveryError;
use crate::scheduler::PeriodicTask;
use crate::sender::Sender;

pub struct SenderTask {
    attributes: DiscoveryAttributes,
    region_names: RwLock<Vec<String>>,
    requester_id: u64,
    stopped: AtomicBool,
}

impl SenderTask {
    /// Create the task and broadcast one request. A failed request is logged.
    pub fn new(attributes: DiscoveryAttributes, region_names: Vec<String>, requester_id: u64) -> Self {
        let task = Self {
            attributes,
            region_names: RwLock::new(region_names),
            requester_id,
            stopped: AtomicBool::new(false),
        };

        match task.open_sender().and_then(|s| s.request_broadcast()) {
            Ok(()) => tracing::debug!(group = %task.attributes.group(), "request broadcast sent"),
            Err(e) => tracing::warn!(
                error = %e,
                group = %task.attributes.group(),
                "failed to send request broadcast"
            ),
        }
        task
    }

    /// Replace the regions advertised from the next tick on.
    pub fn set_region_names(&self, names: Vec<String>) {
        *self.region_names.write() = names;
    }

    pub fn region_names(&self) -> Vec<String> {
        self.region_names.read().clone()
    }

    pub fn attributes(&self) -> &DiscoveryAttributes {
        &self.attributes
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Broadcast one passive message with the current regions. Fails with
    /// `Closed` after `shutdown`.
    pub fn passive_broadcast(&self) -> Result<(), DiscoveryError> {
        if self.is_stopped() {
            return Err(DiscoveryError::Closed);
        }
        let regions = self.region_names();
        self.open_sender()?.passive_broadcast(
            &self.attributes.service_address,
            self.attributes.service_port,
            &regions,
            None,
        )
    }

    /// Stop advertising and broadcast one remove message. A failure is
    /// logged. Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let regions = self.region_names();
        let result = self.open_sender().and_then(|s| {
            s.remove_broadcast(
                &self.attributes.service_address,
                self.attributes.service_port,
                &regions,
                None,
            )
        });
        match result {
            Ok(()) => tracing::info!(group = %self.attributes.group(), "remove broadcast sent"),
            Err(e) => tracing::warn!(error = %e, "failed to send remove broadcast"),
        }
    }

    fn open_sender(&self) -> Result<Sender, DiscoveryError> {
        Ok(Sender::for_attributes(&self.attributes)?.with_requester_id(self.requester_id))
    }
}

impl PeriodicTask for SenderTask {
    fn name(&self) -> &'static str {
        "discovery-advertise"
    }

    fn run(&self) {
        if self.is_stopped() {
            tracing::trace!(group = %self.attributes.group(), "advertise tick after shutdown skipped");
            return;
        }
        if let Err(e) = self.passive_broadcast() {
            tracing::warn!(
                error = %e,
                group = %self.attributes.group(),
                "passive broadcast failed, will retry next tick"
            );
        }
    }
}
