//! Core functionality for the relay

pub mod connection;
pub mod message;
pub mod registry;
pub mod relay;

// Re-export main components for convenience
pub use connection::{Connection, ConnectionId, ConnectionState};
pub use message::{RelayMessage, Welcome};
pub use registry::{Registry, SharedRegistry};
pub use relay::{BroadcastReport, RelayEngine, SharedRelayEngine};
