//! Server configuration module
//! Handles the runtime parameters of the relay, read from the environment

use crate::constants::{
    DEFAULT_HOST, DEFAULT_OUTBOUND_QUEUE_CAPACITY, DEFAULT_PORT, DEFAULT_SHUTDOWN_TIMEOUT_SECS,
    DEFAULT_WELCOME_MESSAGE, DEFAULT_WRITE_TIMEOUT_MS,
};
use crate::error::{Result, RelayError};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Text of the `message` field in the welcome handshake
    pub welcome_message: String,
    /// Upper bound for a single write to one connection
    pub write_timeout: Duration,
    /// Upper bound for closing every connection on shutdown
    pub shutdown_timeout: Duration,
    /// Frames that may wait for a slow client before writes start timing out
    pub outbound_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Loopback, ephemeral port and short timeouts for tests
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            write_timeout: Duration::from_millis(200),
            shutdown_timeout: Duration::from_secs(2),
            outbound_queue_capacity: 8,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key lookup; missing keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("MOTION_RELAY_HOST").unwrap_or(defaults.host);
        let port = parse_var(&lookup, "MOTION_RELAY_PORT")?.unwrap_or(defaults.port);
        let welcome_message =
            lookup("MOTION_RELAY_WELCOME_MESSAGE").unwrap_or(defaults.welcome_message);

        let write_timeout = parse_var::<u64, _>(&lookup, "MOTION_RELAY_WRITE_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.write_timeout);

        let shutdown_timeout = parse_var::<u64, _>(&lookup, "MOTION_RELAY_SHUTDOWN_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.shutdown_timeout);

        let outbound_queue_capacity = parse_var(&lookup, "MOTION_RELAY_OUTBOUND_QUEUE")?
            .unwrap_or(defaults.outbound_queue_capacity);

        let config = Self {
            host,
            port,
            welcome_message,
            write_timeout,
            shutdown_timeout,
            outbound_queue_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.write_timeout.is_zero() {
            return Err(RelayError::ConfigError(
                "write timeout must be greater than zero".to_string(),
            ));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(RelayError::ConfigError(
                "shutdown timeout must be greater than zero".to_string(),
            ));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(RelayError::ConfigError(
                "outbound queue capacity must be greater than zero".to_string(),
            ));
        }
        self.socket_addr().map(|_| ())
    }

    /// The address the listener binds to. `host` is an IPv4 or IPv6
    /// address (brackets optional) or `localhost`.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let host = self.host.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        let ip = if host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            host.parse::<IpAddr>().map_err(|e| {
                RelayError::ConfigError(format!("invalid bind host '{}': {}", self.host, e))
            })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
            RelayError::ConfigError(format!("{} has invalid value '{}': {}", key, raw, e))
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = ServerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.welcome_message, DEFAULT_WELCOME_MESSAGE);
        assert_eq!(config.write_timeout, Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS));
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("MOTION_RELAY_HOST", "127.0.0.1"),
            ("MOTION_RELAY_PORT", "9001"),
            ("MOTION_RELAY_WELCOME_MESSAGE", "hi"),
            ("MOTION_RELAY_WRITE_TIMEOUT_MS", "250"),
            ("MOTION_RELAY_OUTBOUND_QUEUE", "4"),
        ]))
        .unwrap();
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:9001");
        assert_eq!(config.welcome_message, "hi");
        assert_eq!(config.write_timeout, Duration::from_millis(250));
        assert_eq!(config.outbound_queue_capacity, 4);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let result = ServerConfig::from_lookup(lookup_from(&[("MOTION_RELAY_PORT", "http")]));
        let err = result.unwrap_err();
        assert!(matches!(err, RelayError::ConfigError(_)));
        assert!(err.to_string().contains("MOTION_RELAY_PORT"));
    }

    #[test]
    fn test_zero_bounds_are_rejected() {
        assert!(ServerConfig::from_lookup(lookup_from(&[(
            "MOTION_RELAY_WRITE_TIMEOUT_MS",
            "0"
        )]))
        .is_err());
        assert!(
            ServerConfig::from_lookup(lookup_from(&[("MOTION_RELAY_OUTBOUND_QUEUE", "0")]))
                .is_err()
        );
    }

    #[test]
    fn test_ipv6_and_localhost_hosts() {
        let any_v6 = ServerConfig::from_lookup(lookup_from(&[("MOTION_RELAY_HOST", "::")])).unwrap();
        assert_eq!(any_v6.socket_addr().unwrap().to_string(), "[::]:8080");

        let bracketed =
            ServerConfig::from_lookup(lookup_from(&[("MOTION_RELAY_HOST", "[::1]")])).unwrap();
        assert_eq!(bracketed.socket_addr().unwrap().to_string(), "[::1]:8080");

        let local =
            ServerConfig::from_lookup(lookup_from(&[("MOTION_RELAY_HOST", "localhost")])).unwrap();
        assert_eq!(local.socket_addr().unwrap().to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_bad_host_is_rejected() {
        let result = ServerConfig::from_lookup(lookup_from(&[("MOTION_RELAY_HOST", "not a host")]));
        assert!(result.is_err());
    }
}
