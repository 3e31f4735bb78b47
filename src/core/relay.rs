//! Relay engine
//!
//! Decodes inbound payloads and fans them out to every other open
//! connection. Each target is written concurrently with its own timeout, so
//! one slow or dead client cannot hold up the rest; failed targets are
//! dropped from the registry and asked to close.

use futures_util::future::join_all;
use log::{debug, trace, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::connection::ConnectionId;
use crate::core::message::RelayMessage;
use crate::core::registry::SharedRegistry;
use crate::error::Result;

pub struct RelayEngine {
    registry: SharedRegistry,
    write_timeout: Duration,
}

impl RelayEngine {
    pub fn new(registry: SharedRegistry, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Decode a raw payload from `sender` and broadcast it.
    ///
    /// Payloads that fail to decode are logged and dropped; `None` is
    /// returned and nothing is delivered.
    pub async fn relay(&self, sender: &ConnectionId, raw: &str) -> Option<BroadcastReport> {
        let message = match RelayMessage::decode(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping message from {}: {}", sender, e);
                return None;
            }
        };

        if let Some(event_type) = message.event_type() {
            debug!("Received {} event from {}", event_type, sender);
        }

        match self.broadcast(sender, &message).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Failed to broadcast message from {}: {}", sender, e);
                None
            }
        }
    }

    /// Deliver `message` to every open connection except `sender`
    pub async fn broadcast(
        &self,
        sender: &ConnectionId,
        message: &RelayMessage,
    ) -> Result<BroadcastReport> {
        let encoded = message.encode()?;
        let start = Instant::now();

        let targets: Vec<_> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|conn| conn.id != *sender && conn.is_open())
            .collect();

        let sends = targets.iter().map(|conn| {
            let text = encoded.clone();
            async move { (conn, conn.send_text(text, self.write_timeout).await) }
        });
        let results = join_all(sends).await;

        let mut report = BroadcastReport {
            targets: targets.len(),
            ..BroadcastReport::default()
        };
        for (conn, result) in results {
            match result {
                Ok(()) => {
                    trace!("Message sent to {}", conn.id);
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!("Failed to deliver message to {}: {}", conn.id, e);
                    conn.request_close();
                    self.registry.unregister(&conn.id).await;
                    report.failed.push(conn.id);
                }
            }
        }
        report.duration = start.elapsed();

        debug!(
            "Broadcast from {} delivered to {}/{} connections in {:?}",
            sender, report.delivered, report.targets, report.duration
        );
        Ok(report)
    }

    /// Stop new registrations and ask every registered connection to close.
    /// Returns how many connections were asked.
    pub async fn close_all(&self) -> usize {
        self.registry.close().await;
        let connections = self.registry.snapshot().await;
        for conn in &connections {
            conn.request_close();
        }
        connections.len()
    }
}

pub type SharedRelayEngine = Arc<RelayEngine>;

/// Outcome of a single broadcast
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub targets: usize,
    pub delivered: usize,
    pub failed: Vec<ConnectionId>,
    pub duration: Duration,
}

impl BroadcastReport {
    pub fn success_rate(&self) -> f64 {
        if self.targets == 0 {
            1.0
        } else {
            self.delivered as f64 / self.targets as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::Connection;
    use crate::core::registry::Registry;

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let registry = Arc::new(Registry::new());
        let engine = RelayEngine::new(registry.clone(), Duration::from_millis(50));

        let (sender, mut sender_rx) = Connection::channel(4, None);
        let (target, mut target_rx) = Connection::channel(4, None);
        let (sender, target) = (Arc::new(sender), Arc::new(target));
        for conn in [&sender, &target] {
            conn.mark_open();
            registry.register(conn.clone()).await.unwrap();
        }

        let report = engine.relay(&sender.id, r#"{"x":1}"#).await.unwrap();
        assert_eq!(report.targets, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.success_rate(), 1.0);
        assert_eq!(target_rx.recv().await.unwrap().to_str().unwrap(), r#"{"x":1}"#);
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_registry_reports_nothing_to_do() {
        let registry = Arc::new(Registry::new());
        let engine = RelayEngine::new(registry, Duration::from_millis(50));
        let report = engine
            .relay(&ConnectionId::new_v4(), r#"{"x":1}"#)
            .await
            .unwrap();
        assert_eq!(report.targets, 0);
        assert_eq!(report.success_rate(), 1.0);
    }

    #[tokio::test]
    async fn test_close_all_requests_close_and_locks_registry() {
        let registry = Arc::new(Registry::new());
        let engine = RelayEngine::new(registry.clone(), Duration::from_millis(50));
        let (conn, _rx) = Connection::channel(1, None);
        let conn = Arc::new(conn);
        conn.mark_open();
        registry.register(conn.clone()).await.unwrap();

        assert_eq!(engine.close_all().await, 1);
        assert!(!conn.is_open());
        assert!(registry.is_closed());
    }
}
