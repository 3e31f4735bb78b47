//! WebSocket connection handle
//! Carries the identity, liveness state and outbound queue of one client

use chrono::{DateTime, Utc};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;
use warp::ws::Message;

use crate::error::{Result, RelayError};

pub type ConnectionId = Uuid;

/// Liveness of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Represents the state of a single WebSocket connection
pub struct Connection {
    pub id: ConnectionId,
    pub remote_addr: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<Message>,
    state: AtomicU8,
    close_signal: Notify,
}

impl Connection {
    /// Create a connection in the CONNECTING state writing into `sender`
    pub fn new(sender: mpsc::Sender<Message>, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote_addr,
            connected_at: Utc::now(),
            sender,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            close_signal: Notify::new(),
        }
    }

    /// Create a connection together with the receiving end of its outbound queue
    pub fn channel(
        capacity: usize,
        remote_addr: Option<SocketAddr>,
    ) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx, remote_addr), rx)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// CONNECTING -> OPEN. Returns false if the connection already moved on.
    pub fn mark_open(&self) -> bool {
        self.transition(ConnectionState::Connecting, ConnectionState::Open)
    }

    /// CONNECTING or OPEN -> CLOSING. Returns false if already closing or closed.
    pub fn begin_close(&self) -> bool {
        self.transition(ConnectionState::Open, ConnectionState::Closing)
            || self.transition(ConnectionState::Connecting, ConnectionState::Closing)
    }

    pub fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::SeqCst);
    }

    /// Ask the task driving this connection to tear it down
    pub fn request_close(&self) {
        self.begin_close();
        self.close_signal.notify_one();
    }

    /// Resolves once `request_close` has been called
    pub async fn close_requested(&self) {
        self.close_signal.notified().await
    }

    /// Queue a text frame, waiting at most `timeout` for room in the queue
    pub async fn send_text(&self, text: impl Into<String>, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.sender.send(Message::text(text))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RelayError::ConnectionClosed),
            Err(_) => Err(RelayError::WriteTimeout(self.id.to_string())),
        }
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> chrono::Duration {
        Utc::now() - self.connected_at
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine() {
        let (conn, _rx) = Connection::channel(1, None);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.mark_open());
        assert!(!conn.mark_open());
        assert!(conn.is_open());
        assert!(conn.begin_close());
        assert!(!conn.begin_close());
        assert_eq!(conn.state(), ConnectionState::Closing);
        conn.mark_closed();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.mark_open());
    }

    #[tokio::test]
    async fn test_send_text_reaches_queue() {
        let (conn, mut rx) = Connection::channel(1, None);
        conn.send_text("hello", Duration::from_millis(50)).await.unwrap();
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.to_str().unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_send_text_times_out_on_full_queue() {
        let (conn, _rx) = Connection::channel(1, None);
        conn.send_text("first", Duration::from_millis(50)).await.unwrap();
        let err = conn
            .send_text("second", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::WriteTimeout(_)));
    }

    #[tokio::test]
    async fn test_send_text_fails_when_writer_is_gone() {
        let (conn, rx) = Connection::channel(1, None);
        drop(rx);
        let err = conn
            .send_text("hello", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_close_request_is_remembered() {
        let (conn, _rx) = Connection::channel(1, None);
        conn.mark_open();
        conn.request_close();
        assert_eq!(conn.state(), ConnectionState::Closing);
        // The permit is stored even though nobody was waiting yet
        tokio::time::timeout(Duration::from_millis(50), conn.close_requested())
            .await
            .unwrap();
    }
}
