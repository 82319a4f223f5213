//! Runtime attributes of one discovery service.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use crate::wire::{
    ADVERTISE_INTERVAL_SECS, DEFAULT_GROUP_PORT, DEFAULT_MAX_IDLE_SECS, DEFAULT_MULTICAST_TTL,
};

/// Everything a discovery service needs to know about the network it joins
/// and the local cache service it advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryAttributes {
    pub group_addr: Ipv4Addr,
    pub group_port: u16,
    /// Address advertised in passive broadcasts. Empty until resolved.
    pub service_address: String,
    pub service_port: u16,
    pub advertise_interval: Duration,
    /// Idle threshold for reaping peers, and the cleanup sweep period.
    pub max_idle_secs: u64,
    pub ttl: u32,
    /// Interface to join the group on. `None` lets the OS choose.
    pub interface: Option<Ipv4Addr>,
    pub dispatch_queue_size: usize,
}

impl Default for DiscoveryAttributes {
    fn default() -> Self {
        Self {
            group_addr: Ipv4Addr::new(228, 4, 5, 6),
            group_port: DEFAULT_GROUP_PORT,
            service_address: String::new(),
            service_port: 0,
            advertise_interval: Duration::from_secs(ADVERTISE_INTERVAL_SECS),
            max_idle_secs: DEFAULT_MAX_IDLE_SECS,
            ttl: DEFAULT_MULTICAST_TTL,
            interface: None,
            dispatch_queue_size: 64,
        }
    }
}

impl DiscoveryAttributes {
    /// The multicast group as a socket address.
    pub fn group(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group_addr, self.group_port)
    }

    pub fn cleanup_period(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }
}

impl std::fmt::Display for DiscoveryAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "group={}:{} service={}:{} max_idle={}s",
            self.group_addr,
            self.group_port,
            self.service_address,
            self.service_port,
            self.max_idle_secs
        )
    }
}
