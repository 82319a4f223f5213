//! Discovery errors.

use lateral_core::WireError;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The multicast endpoint could not be created, bound or joined.
    #[error("failed to set up discovery endpoint {addr}: {source}")]
    Setup {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A datagram could not be sent or received.
    #[error("discovery transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The endpoint was never opened or has been closed.
    #[error("discovery endpoint is closed")]
    Closed,

    #[error(transparent)]
    Codec(#[from] WireError),
}

impl DiscoveryError {
    pub(crate) fn setup(addr: impl std::fmt::Display, source: std::io::Error) -> Self {
        DiscoveryError::Setup {
            addr: addr.to_string(),
            source,
        }
    }
}
