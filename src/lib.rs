//! Motion Relay - a WebSocket relay for real-time JSON events
//!
//! Clients connect over WebSocket, and every JSON object one client sends
//! is broadcast verbatim to all other connected clients.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod server;
pub mod shutdown;

// Re-export main components
pub use config::*;
pub use constants::*;
pub use error::{RelayError, Result};
pub use server::RelayServer;
