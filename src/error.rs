use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum RelayError {
    // Registry errors
    AlreadyRegistered(String),
    NotOpen(String),
    RegistryClosed,

    // Message errors
    MessageParseError(String),

    // Connection errors
    ConnectionClosed,
    WriteTimeout(String),

    // Startup errors
    ConfigError(String),
    BindError(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered(id) => write!(f, "Connection already registered: {}", id),
            Self::NotOpen(id) => write!(f, "Connection is not open: {}", id),
            Self::RegistryClosed => write!(f, "Registry is closed to new connections"),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection closed unexpectedly"),
            Self::WriteTimeout(id) => write!(f, "Write to {} timed out", id),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::BindError(msg) => write!(f, "Failed to bind listener: {}", msg),
        }
    }
}

impl Error for RelayError {}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::MessageParseError(err.to_string())
    }
}

impl From<warp::Error> for RelayError {
    fn from(err: warp::Error) -> Self {
        RelayError::BindError(err.to_string())
    }
}

// Generic result type for the relay
pub type Result<T> = std::result::Result<T, RelayError>;
