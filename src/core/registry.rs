//! Registry of broadcast-eligible connections

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

use crate::core::connection::{Connection, ConnectionId};
use crate::error::{Result, RelayError};

/// The set of open connections, keyed by connection id.
///
/// A connection is present only while it is OPEN; the lifecycle handler adds
/// it after the upgrade and removes it on teardown.
pub struct Registry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    closed: AtomicBool,
    emptied: Notify,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            emptied: Notify::new(),
        }
    }

    /// Add an open connection. Nothing changes on error.
    pub async fn register(&self, conn: Arc<Connection>) -> Result<()> {
        if !conn.is_open() {
            return Err(RelayError::NotOpen(conn.id.to_string()));
        }

        let mut connections = self.connections.write().await;
        // Checked under the write lock so close() cannot slip in between
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelayError::RegistryClosed);
        }
        if connections.contains_key(&conn.id) {
            return Err(RelayError::AlreadyRegistered(conn.id.to_string()));
        }
        connections.insert(conn.id, conn);
        Ok(())
    }

    /// Remove a connection; returns whether it was present
    pub async fn unregister(&self, id: &ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(id).is_some();
        if removed && connections.is_empty() {
            self.emptied.notify_waiters();
        }
        removed
    }

    /// Point-in-time copy of every registered connection
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.values().cloned().collect()
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Refuse further registrations; existing entries are untouched
    pub async fn close(&self) {
        let _guard = self.connections.write().await;
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once the registry holds no connections
    pub async fn wait_until_empty(&self) {
        loop {
            let emptied = self.emptied.notified();
            if self.is_empty().await {
                return;
            }
            emptied.await;
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedRegistry = Arc<Registry>;
