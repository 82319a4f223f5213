//! Lateral wire format — the discovery datagram.
//!
//! One message per datagram, never fragmented. The payload is a JSON object:
//!
//! ```text
//! { "type": "PASSIVE" | "REQUEST" | "REMOVE",
//!   "host": "10.0.0.7", "port": 1110,
//!   "requesterId": 8163372051187452115,
//!   "regionNames": ["users", "sessions"] }
//! ```
//!
//! Field names are part of the protocol. Renaming one breaks interop with
//! every node already on the segment.

use serde::{Deserialize, Serialize};

// ── Message ──────────────────────────────────────────────────────────────────

/// What a discovery datagram asks of its receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    /// Periodic, unsolicited "I am here and serve these regions".
    Passive,
    /// "Everyone, announce yourselves now." Sent once at startup.
    Request,
    /// "I am leaving, evict me." Sent once at shutdown.
    Remove,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageType::Passive => "PASSIVE",
            MessageType::Request => "REQUEST",
            MessageType::Remove => "REMOVE",
        };
        f.write_str(s)
    }
}

/// A decoded discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// Address the sender's cache service listens on.
    /// Receivers overwrite this with the datagram's source address.
    #[serde(default)]
    pub host: String,

    /// Port the sender's cache service listens on.
    #[serde(default)]
    pub port: u16,

    /// Process id of the sender. Used to drop our own multicast echo.
    pub requester_id: u64,

    /// Cache regions the sender participates in.
    #[serde(default)]
    pub region_names: Vec<String>,
}

impl Message {
    /// A request broadcast carries no payload beyond its origin.
    pub fn request(requester_id: u64) -> Self {
        Self {
            message_type: MessageType::Request,
            host: String::new(),
            port: 0,
            requester_id,
            region_names: Vec::new(),
        }
    }

    pub fn passive(host: &str, port: u16, region_names: &[String], requester_id: u64) -> Self {
        Self {
            message_type: MessageType::Passive,
            host: host.to_string(),
            port,
            requester_id,
            region_names: region_names.to_vec(),
        }
    }

    pub fn remove(host: &str, port: u16, region_names: &[String], requester_id: u64) -> Self {
        Self {
            message_type: MessageType::Remove,
            host: host.to_string(),
            port,
            requester_id,
            region_names: region_names.to_vec(),
        }
    }
}

// ── Codec ────────────────────────────────────────────────────────────────────

/// Encode a message into datagram bytes.
///
/// Fails if the encoding would not fit in a single UDP datagram.
pub fn encode(message: &Message) -> Result<Vec<u8>, WireError> {
    let bytes = serde_json::to_vec(message).map_err(|e| WireError::Encode(e.to_string()))?;
    if bytes.len() > MAX_DATAGRAM {
        return Err(WireError::DatagramTooLarge(bytes.len()));
    }
    Ok(bytes)
}

/// Decode datagram bytes into a message.
pub fn decode(bytes: &[u8]) -> Result<Message, WireError> {
    if bytes.is_empty() {
        return Err(WireError::Empty);
    }
    serde_json::from_slice(bytes).map_err(|e| WireError::Decode(e.to_string()))
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default multicast group for discovery traffic.
pub const DEFAULT_GROUP_ADDR: &str = "228.4.5.6";

/// Default multicast port for discovery traffic.
pub const DEFAULT_GROUP_PORT: u16 = 5678;

/// Default passive broadcast interval in seconds.
pub const ADVERTISE_INTERVAL_SECS: u64 = 15;

/// Default idle time in seconds after which a silent peer is reaped.
/// Also the cadence of the cleanup sweep.
pub const DEFAULT_MAX_IDLE_SECS: u64 = 180;

/// Default multicast TTL. 1 keeps discovery on the local segment.
pub const DEFAULT_MULTICAST_TTL: u32 = 1;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM: usize = 65_507;

/// Size of the receiver's datagram buffer.
pub const RECEIVE_BUFFER_SIZE: usize = 65_536;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when encoding or decoding a discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("empty datagram")]
    Empty,

    #[error("failed to decode discovery message: {0}")]
    Decode(String),

    #[error("failed to encode discovery message: {0}")]
    Encode(String),

    #[error("encoded message is {0} bytes, maximum is {}", MAX_DATAGRAM)]
    DatagramTooLarge(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
