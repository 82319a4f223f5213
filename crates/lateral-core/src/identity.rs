//! Process-wide requester id.
//!
//! Every discovery datagram carries the id of the process that sent it.
//! Multicast loops our own datagrams back to us; the id is how we recognise
//! and drop them.

use std::sync::OnceLock;

static REQUESTER_ID: OnceLock<u64> = OnceLock::new();

/// The id of this process. Random, fixed for the lifetime of the process.
pub fn requester_id() -> u64 {
    *REQUESTER_ID.get_or_init(rand::random)
}
