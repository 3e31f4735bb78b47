//! Request handlers for the relay endpoints

pub mod status;
pub mod websocket;

pub use status::{handle_status, StatusReport};
pub use websocket::handle_ws_client;
