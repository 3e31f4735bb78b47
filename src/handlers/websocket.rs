use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use warp::ws::{Message, WebSocket};

use crate::config::ServerConfig;
use crate::core::connection::Connection;
use crate::core::message::Welcome;
use crate::core::relay::SharedRelayEngine;

// Handle a WebSocket connection from upgrade to teardown
pub async fn handle_ws_client(
    ws: WebSocket,
    remote_addr: Option<SocketAddr>,
    relay: SharedRelayEngine,
    config: Arc<ServerConfig>,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (conn, outbound_rx) = Connection::channel(config.outbound_queue_capacity, remote_addr);
    let conn = Arc::new(conn);

    // Spawn a task to forward queued frames to the WebSocket
    let (stop_tx, stop_rx) = oneshot::channel();
    let writer = tokio::spawn(write_loop(
        ws_tx,
        outbound_rx,
        stop_rx,
        conn.clone(),
        config.write_timeout,
    ));

    // The upgrade is complete, so the connection is open
    conn.mark_open();

    // Queued before registering so it is the first frame the client sees
    match Welcome::new(config.welcome_message.as_str()).encode() {
        Ok(text) => {
            if let Err(e) = conn.send_text(text, config.write_timeout).await {
                warn!("Failed to send welcome message to {}: {}", conn.id, e);
            }
        }
        Err(e) => error!("Failed to serialize welcome message: {}", e),
    }

    match relay.registry().register(conn.clone()).await {
        Ok(()) => {
            info!(
                "Client connected: {} from {}",
                conn.id,
                display_addr(remote_addr)
            );
            info!("Current connections: {}", relay.registry().len().await);
        }
        Err(e) => {
            warn!("Refusing connection {}: {}", conn.id, e);
            teardown(&conn, &relay, stop_tx, writer, config.write_timeout).await;
            return;
        }
    }

    // Handle incoming messages one at a time
    loop {
        tokio::select! {
            _ = conn.close_requested() => {
                debug!("Close requested for {}", conn.id);
                break;
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(msg)) => {
                    if msg.is_close() {
                        debug!("Client {} sent close frame", conn.id);
                        break;
                    }
                    process_message(&msg, &conn, &relay).await;
                }
                Some(Err(e)) => {
                    warn!("WebSocket error on {}: {}", conn.id, e);
                    break;
                }
                None => break,
            }
        }
    }

    teardown(&conn, &relay, stop_tx, writer, config.write_timeout).await;
}

// Process an incoming WebSocket frame
async fn process_message(msg: &Message, conn: &Connection, relay: &SharedRelayEngine) {
    let text = if msg.is_text() {
        msg.to_str().ok()
    } else if msg.is_binary() {
        std::str::from_utf8(msg.as_bytes()).ok()
    } else {
        // Ping and pong are answered by the transport
        return;
    };

    match text {
        Some(text) => {
            if let Some(report) = relay.relay(&conn.id, text).await {
                debug!(
                    "Relayed message from {} to {} clients",
                    conn.id, report.delivered
                );
            }
        }
        None => warn!("Dropping non UTF-8 frame from {}", conn.id),
    }
}

// Shared exit path for close frames, transport errors and close requests
async fn teardown(
    conn: &Arc<Connection>,
    relay: &SharedRelayEngine,
    stop_tx: oneshot::Sender<()>,
    writer: tokio::task::JoinHandle<()>,
    write_timeout: Duration,
) {
    conn.begin_close();
    relay.registry().unregister(&conn.id).await;

    // The writer may already be gone after a socket error
    let _ = stop_tx.send(());
    match timeout(write_timeout * 2, writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Writer task for {} failed: {}", conn.id, e),
        Err(_) => warn!("Writer task for {} did not stop in time", conn.id),
    }

    conn.mark_closed();
    info!(
        "Client disconnected: {} after {}s",
        conn.id,
        conn.connection_duration().num_seconds()
    );
    info!("Current connections: {}", relay.registry().len().await);
}

// Forward queued frames to the socket until stopped, then flush and close
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    mut stop: oneshot::Receiver<()>,
    conn: Arc<Connection>,
    write_timeout: Duration,
) {
    loop {
        tokio::select! {
            _ = &mut stop => break,
            frame = rx.recv() => match frame {
                Some(message) => match timeout(write_timeout, ws_tx.send(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!("Failed to send WebSocket message to {}: {}", conn.id, e);
                        conn.request_close();
                        return;
                    }
                    Err(_) => {
                        warn!("WebSocket write to {} timed out", conn.id);
                        conn.request_close();
                        return;
                    }
                },
                None => break,
            }
        }
    }

    rx.close();
    let flush = async {
        while let Ok(message) = rx.try_recv() {
            if ws_tx.send(message).await.is_err() {
                return;
            }
        }
        if let Err(e) = ws_tx.close().await {
            debug!("Error while closing socket for {}: {}", conn.id, e);
        }
    };
    if timeout(write_timeout, flush).await.is_err() {
        debug!("Closing socket for {} timed out", conn.id);
    }
}

fn display_addr(addr: Option<SocketAddr>) -> String {
    addr.map(|a| a.to_string())
        .unwrap_or_else(|| "unknown address".to_string())
}
