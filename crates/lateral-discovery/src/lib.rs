//! lateral-discovery — find lateral cache peers over UDP multicast.
//!
//! A [`DiscoveryService`] advertises the regions this node serves, listens
//! for the advertisements of its peers, and keeps a registry of who is out
//! there. The [`DiscoveryManager`] makes sure a process runs at most one
//! service per group and local service port.

pub mod cleanup;
pub mod error;
pub mod listener;
pub mod manager;
pub mod peer;
pub mod pool;
pub mod receiver;
pub mod registry;
pub mod scheduler;
pub mod sender;
pub mod sender_task;
pub mod service;

pub use cleanup::CleanupRunner;
pub use error::DiscoveryError;
pub use listener::{DiscoveryListener, ShutdownObserver, ShutdownRegistry};
pub use manager::{DiscoveryManager, ServiceKey, ShutdownHooks};
pub use peer::{now_millis, DiscoveredService, PeerKey};
pub use pool::DispatchPool;
pub use receiver::{Disposition, MessageHandler, Receiver};
pub use registry::{PeerRegistry, SharedRegistry};
pub use scheduler::{PeriodicTask, Scheduler, TokioScheduler};
pub use sender::Sender;
pub use sender_task::SenderTask;
pub use service::DiscoveryService;
