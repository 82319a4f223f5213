//! Lateral integration test harness.
//!
//! Tests in this crate run several discovery services inside one process
//! and let them find each other over the real multicast group, with
//! multicast loopback carrying the traffic. Each test uses its own group
//! port so tests can run in parallel without hearing each other.
//!
//! Hosts without a multicast route (some containers, CI sandboxes) cannot
//! run these; every test checks first and skips gracefully.

mod discovery;
mod fault;
mod lifecycle;

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};

use lateral_core::DiscoveryAttributes;
use lateral_discovery::{DiscoveredService, DiscoveryListener, DiscoveryService};

// ── Harness ───────────────────────────────────────────────────────────────────

pub const GROUP: Ipv4Addr = Ipv4Addr::new(228, 4, 5, 6);

/// Requester ids of the two logical nodes used throughout tests.
pub const NODE_A: u64 = 0xA;
pub const NODE_B: u64 = 0xB;

/// Check whether a multicast datagram sent to `GROUP:port` loops back to a
/// socket joined to the group on this host.
pub fn multicast_available(port: u16) -> bool {
    probe_multicast(port).is_ok()
}

fn probe_multicast(port: u16) -> Result<()> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
    socket.join_multicast_v4(&GROUP, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_loop_v4(true)?;
    let listener: UdpSocket = socket.into();
    listener.set_read_timeout(Some(Duration::from_millis(500)))?;

    let sender = UdpSocket::bind("0.0.0.0:0")?;
    sender.set_multicast_loop_v4(true)?;
    sender.send_to(b"probe", SocketAddrV4::new(GROUP, port))?;

    let mut buf = [0u8; 16];
    let (len, _) = listener.recv_from(&mut buf).context("no multicast loopback")?;
    if &buf[..len] != b"probe" {
        bail!("unexpected probe reply");
    }
    let _ = listener.leave_multicast_v4(&GROUP, &Ipv4Addr::UNSPECIFIED);
    Ok(())
}

/// Tests call this and return early if multicast cannot work here.
pub fn skip_unless_ready(port: u16) -> bool {
    if multicast_available(port) {
        return true;
    }
    eprintln!("SKIP: multicast loopback unavailable on this host");
    false
}

/// Attributes for a node on `group_port` that serves on `service_port`.
pub fn attributes(group_port: u16, service_port: u16) -> DiscoveryAttributes {
    DiscoveryAttributes {
        group_addr: GROUP,
        group_port,
        service_port,
        ..Default::default()
    }
}

/// Create and start a logical node.
pub fn spawn_node(
    group_port: u16,
    service_port: u16,
    requester_id: u64,
    regions: &[&str],
) -> Arc<DiscoveryService> {
    let service = DiscoveryService::with_requester_id(attributes(group_port, service_port), requester_id);
    for region in regions {
        service.add_participating_region(region);
    }
    service.startup();
    service
}

/// Poll `condition` every 20ms until it holds or `timeout` elapses.
pub async fn wait_for_condition(timeout: Duration, mut condition: impl FnMut() -> bool) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("condition not met within {timeout:?}")
}

/// Entry for the peer serving on `service_port`, if known.
pub fn peer_on(service: &DiscoveryService, service_port: u16) -> Option<DiscoveredService> {
    service
        .discovered_peers()
        .into_iter()
        .find(|p| p.port == service_port)
}

/// Records every callback it receives.
#[derive(Default)]
pub struct RecordingListener {
    pub discovered: Mutex<Vec<DiscoveredService>>,
    pub removed: Mutex<Vec<DiscoveredService>>,
}

impl RecordingListener {
    pub fn removed_on(&self, service_port: u16) -> usize {
        self.removed
            .lock()
            .iter()
            .filter(|p| p.port == service_port)
            .count()
    }

    pub fn discovered_on(&self, service_port: u16) -> usize {
        self.discovered
            .lock()
            .iter()
            .filter(|p| p.port == service_port)
            .count()
    }
}

impl DiscoveryListener for RecordingListener {
    fn on_peer_discovered_or_updated(&self, service: &DiscoveredService) {
        self.discovered.lock().push(service.clone());
    }

    fn on_peer_removed(&self, service: &DiscoveredService) {
        self.removed.lock().push(service.clone());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// Verify the probe itself: a joined socket hears a looped-back datagram.
#[test]
fn test_multicast_probe() {
    if !skip_unless_ready(46_000) {
        return;
    }
    assert!(multicast_available(46_000));
}
