//! Discovery datagram sender.
//!
//! A `Sender` is cheap and short-lived: periodic tasks open a fresh one per
//! tick and drop it afterwards, so a broken socket never outlives one send.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use lateral_core::{requester_id, wire, DiscoveryAttributes, Message};

use crate::error::DiscoveryError;

pub struct Sender {
    socket: Option<Socket>,
    destination: SocketAddrV4,
    requester_id: u64,
}

impl Sender {
    /// Open an endpoint that sends to the multicast group `group`.
    pub fn new(
        group: SocketAddrV4,
        ttl: u32,
        interface: Option<Ipv4Addr>,
    ) -> Result<Self, DiscoveryError> {
        let socket = make_sender_socket(group, ttl, interface)
            .map_err(|e| DiscoveryError::setup(group, e))?;

        Ok(Self {
            socket: Some(socket),
            destination: group,
            requester_id: requester_id(),
        })
    }

    /// Open an endpoint for the group described by `attributes`.
    pub fn for_attributes(attributes: &DiscoveryAttributes) -> Result<Self, DiscoveryError> {
        Self::new(attributes.group(), attributes.ttl, attributes.interface)
    }

    /// Override the origin id stamped on messages that do not name one.
    pub fn with_requester_id(mut self, id: u64) -> Self {
        self.requester_id = id;
        self
    }

    pub fn destination(&self) -> SocketAddrV4 {
        self.destination
    }

    /// Encode and send one datagram. No fragmentation, no retry.
    pub fn send(&self, message: &Message) -> Result<(), DiscoveryError> {
        let socket = self.socket.as_ref().ok_or(DiscoveryError::Closed)?;
        let bytes = wire::encode(message)?;
        let sent = socket.send_to(&bytes, &SockAddr::from(self.destination))?;

        tracing::debug!(
            message_type = %message.message_type,
            bytes = sent,
            group = %self.destination,
            "discovery message sent"
        );
        Ok(())
    }

    /// Ask every peer to announce itself now.
    pub fn request_broadcast(&self) -> Result<(), DiscoveryError> {
        self.send(&Message::request(self.requester_id))
    }

    /// Announce that `host:port` serves `region_names`.
    pub fn passive_broadcast(
        &self,
        host: &str,
        port: u16,
        region_names: &[String],
        origin_id: Option<u64>,
    ) -> Result<(), DiscoveryError> {
        let origin = origin_id.unwrap_or(self.requester_id);
        self.send(&Message::passive(host, port, region_names, origin))
    }

    /// Announce that `host:port` is leaving.
    pub fn remove_broadcast(
        &self,
        host: &str,
        port: u16,
        region_names: &[String],
        origin_id: Option<u64>,
    ) -> Result<(), DiscoveryError> {
        let origin = origin_id.unwrap_or(self.requester_id);
        self.send(&Message::remove(host, port, region_names, origin))
    }

    /// Close the endpoint. Safe to call more than once.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            tracing::trace!(group = %self.destination, "discovery sender closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.close();
    }
}

/// Create a UDP socket suitable for sending IPv4 multicast.
fn make_sender_socket(
    group: SocketAddrV4,
    ttl: u32,
    interface: Option<Ipv4Addr>,
) -> io::Result<Socket> {
    if !group.ip().is_multicast() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a multicast address", group.ip()),
        ));
    }

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_multicast_ttl_v4(ttl)?;
    // Loopback on: nodes sharing a host must hear each other.
    socket.set_multicast_loop_v4(true)?;
    if let Some(iface) = interface {
        socket.set_multicast_if_v4(&iface)?;
    }
    Ok(socket)
}
