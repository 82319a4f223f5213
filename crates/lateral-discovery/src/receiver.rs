//! Discovery datagram receiver.
//!
//! Joins the discovery multicast group and reads datagrams from peers.
//! Decoded messages are handed to a two-worker dispatch pool so registry
//! updates and listener callbacks never hold up the socket. A datagram that
//! fails to decode is logged and skipped; nothing short of shutdown stops the
//! loop.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use lateral_core::wire::{self, RECEIVE_BUFFER_SIZE};
use lateral_core::{DiscoveryAttributes, Message, MessageType};

use crate::error::DiscoveryError;
use crate::peer::DiscoveredService;
use crate::pool::{DispatchPool, DISPATCH_POOL_SIZE};
use crate::service::DiscoveryService;

pub struct Receiver {
    /// Taken by `run`, or by `shutdown` if the loop never started.
    socket: Mutex<Option<std::net::UdpSocket>>,
    group: Ipv4Addr,
    port: u16,
    interface: Ipv4Addr,
    queue_size: usize,
    message_count: AtomicU64,
    stopped: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl Receiver {
    /// Bind the group port and join the group. Does not start reading.
    pub fn new(
        group: SocketAddrV4,
        interface: Option<Ipv4Addr>,
        queue_size: usize,
    ) -> Result<Self, DiscoveryError> {
        let interface = interface.unwrap_or(Ipv4Addr::UNSPECIFIED);
        let socket =
            make_listener_socket(group, interface).map_err(|e| DiscoveryError::setup(group, e))?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            socket: Mutex::new(Some(socket)),
            group: *group.ip(),
            port: group.port(),
            interface,
            queue_size,
            message_count: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            shutdown_tx,
        })
    }

    pub fn for_attributes(attributes: &DiscoveryAttributes) -> Result<Self, DiscoveryError> {
        Self::new(
            attributes.group(),
            attributes.interface,
            attributes.dispatch_queue_size,
        )
    }

    /// Datagrams received and decoded since creation.
    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Read datagrams until `shutdown` is called.
    ///
    /// Must be called from within a tokio runtime. Returns `Closed` if the
    /// receiver was already shut down or is already running.
    pub async fn run(self: Arc<Self>, handler: Arc<MessageHandler>) -> Result<(), DiscoveryError> {
        // Subscribe before checking `stopped` so a concurrent shutdown is seen
        // either by the flag or by the channel.
        let mut shutdown = self.shutdown_tx.subscribe();
        let std_socket = self.socket.lock().take().ok_or(DiscoveryError::Closed)?;
        if self.is_stopped() {
            return Ok(());
        }

        let socket = UdpSocket::from_std(std_socket)?;
        let pool = DispatchPool::new(DISPATCH_POOL_SIZE, self.queue_size);
        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];

        tracing::info!(
            group = %self.group,
            port = self.port,
            workers = DISPATCH_POOL_SIZE,
            "discovery receiver starting"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,

                result = socket.recv_from(&mut buf) => {
                    let (len, source) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "discovery recv_from failed");
                            continue;
                        }
                    };

                    let mut message = match wire::decode(&buf[..len]) {
                        Ok(m) => m,
                        Err(e) => {
                            tracing::warn!(error = %e, %source, bytes = len, "dropping undecodable discovery datagram");
                            continue;
                        }
                    };

                    // Trust the packet, not the payload.
                    message.host = source.ip().to_string();

                    let count = self.message_count.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::trace!(
                        count,
                        %source,
                        message_type = %message.message_type,
                        "discovery message received"
                    );

                    let handler = handler.clone();
                    pool.submit(move || {
                        handler.handle(message);
                    });
                }
            }
        }

        if let Err(e) = socket.leave_multicast_v4(self.group, self.interface) {
            tracing::warn!(error = %e, group = %self.group, "failed to leave discovery group");
        }
        drop(socket);
        pool.shutdown();

        tracing::info!(
            received = self.message_count(),
            discarded = pool.discarded(),
            "discovery receiver stopped"
        );
        Ok(())
    }

    /// Stop reading, leave the group, close the socket and drop queued
    /// messages. Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        // Never started: close the socket here.
        if let Some(socket) = self.socket.lock().take() {
            if let Err(e) = socket.leave_multicast_v4(&self.group, &self.interface) {
                tracing::warn!(error = %e, group = %self.group, "failed to leave discovery group");
            }
        }
        // No subscribers just means the loop is not running.
        let _ = self.shutdown_tx.send(());
    }
}

/// Create a UDP socket bound to the group port and joined to the group.
fn make_listener_socket(
    group: SocketAddrV4,
    interface: Ipv4Addr,
) -> std::io::Result<std::net::UdpSocket> {
    if !group.ip().is_multicast() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a multicast address", group.ip()),
        ));
    }

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    // Several services in one process, or several processes on one host,
    // share the group port.
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port());
    socket.bind(&bind_addr.into())?;
    socket.join_multicast_v4(group.ip(), &interface)?;
    socket.set_multicast_loop_v4(true)?;

    Ok(socket.into())
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// What the handler did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Sent by this process; multicast echoed it back.
    SelfEcho,
    /// Missing host or regions.
    Malformed,
    /// The owning service is gone.
    Orphaned,
    /// A request, answered with a passive broadcast.
    Answered,
    Removed,
    Upserted,
}

/// Applies one received message to the owning service.
pub struct MessageHandler {
    service: Weak<DiscoveryService>,
    requester_id: u64,
}

impl MessageHandler {
    pub fn new(service: Weak<DiscoveryService>, requester_id: u64) -> Self {
        Self {
            service,
            requester_id,
        }
    }

    pub fn handle(&self, message: Message) -> Disposition {
        if message.requester_id == self.requester_id {
            tracing::trace!(message_type = %message.message_type, "ignoring message sent from self");
            return Disposition::SelfEcho;
        }

        // A request names no peer; only its origin matters.
        if message.message_type != MessageType::Request
            && (message.host.is_empty() || message.region_names.is_empty())
        {
            tracing::trace!(?message, "ignoring invalid discovery message");
            return Disposition::Malformed;
        }

        let Some(service) = self.service.upgrade() else {
            return Disposition::Orphaned;
        };

        match message.message_type {
            MessageType::Request => {
                tracing::debug!(from = %message.host, "answering request broadcast");
                service.service_request_broadcast();
                Disposition::Answered
            }
            MessageType::Remove => {
                tracing::debug!(from = %message.host, port = message.port, "peer announced removal");
                service.remove_peer(&DiscoveredService::from_message(&message));
                Disposition::Removed
            }
            MessageType::Passive => {
                service.add_or_update_peer(DiscoveredService::from_message(&message));
                Disposition::Upserted
            }
        }
    }
}
