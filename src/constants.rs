// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

pub const WELCOME_MESSAGE_TYPE: &str = "welcome";
pub const DEFAULT_WELCOME_MESSAGE: &str = "Connected to Motion Relay Server";

// Delivery and shutdown bounds
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 64;

// HTTP routes served next to the WebSocket upgrade
pub const HEALTH_PATH: &str = "health";
pub const STATUS_PATH: &str = "status";
