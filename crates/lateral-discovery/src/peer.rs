//! Discovered peers.

use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use lateral_core::Message;

/// A lateral peer as last seen in a discovery datagram.
///
/// Identity is `(address, port)` only. Region names and the timestamp are
/// payload: they change on every refresh while the entry stays the same peer.
#[derive(Debug, Clone)]
pub struct DiscoveredService {
    pub address: String,
    pub port: u16,
    pub region_names: Vec<String>,
    /// Milliseconds since the Unix epoch.
    pub last_heard_from: u64,
}

impl DiscoveredService {
    pub fn new(address: impl Into<String>, port: u16, region_names: Vec<String>) -> Self {
        Self::heard_at(address, port, region_names, now_millis())
    }

    pub fn heard_at(
        address: impl Into<String>,
        port: u16,
        region_names: Vec<String>,
        last_heard_from: u64,
    ) -> Self {
        Self {
            address: address.into(),
            port,
            region_names,
            last_heard_from,
        }
    }

    /// Build an entry from a received message, stamped now.
    pub fn from_message(message: &Message) -> Self {
        Self::new(
            message.host.clone(),
            message.port,
            message.region_names.clone(),
        )
    }

    pub fn key(&self) -> PeerKey {
        PeerKey {
            address: self.address.clone(),
            port: self.port,
        }
    }

    /// Milliseconds since this peer was last heard from. Zero if `now` is
    /// behind the stored timestamp.
    pub fn idle_millis(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_heard_from)
    }
}

impl PartialEq for DiscoveredService {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.port == other.port
    }
}

impl Eq for DiscoveredService {}

impl Hash for DiscoveredService {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.port.hash(state);
    }
}

impl std::fmt::Display for DiscoveredService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} regions={:?}",
            self.address, self.port, self.region_names
        )
    }
}

/// Registry key of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerKey {
    pub address: String,
    pub port: u16,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
