//! lateral-core — discovery wire format, attributes and configuration.
//! All other Lateral crates depend on this one.

pub mod attributes;
pub mod config;
pub mod identity;
pub mod net;
pub mod wire;

pub use attributes::DiscoveryAttributes;
pub use identity::requester_id;
pub use wire::{Message, MessageType, WireError};
