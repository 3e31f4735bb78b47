//! Relay server: routes, listener and graceful shutdown

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use warp::Filter;

use crate::config::ServerConfig;
use crate::constants::{HEALTH_PATH, STATUS_PATH};
use crate::core::registry::{Registry, SharedRegistry};
use crate::core::relay::{RelayEngine, SharedRelayEngine};
use crate::error::Result;
use crate::handlers::{handle_status, handle_ws_client};

/// Owns the relay state shared by every connection task
pub struct RelayServer {
    config: Arc<ServerConfig>,
    relay: SharedRelayEngine,
    started_at: DateTime<Utc>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(Registry::new());
        let relay = Arc::new(RelayEngine::new(registry, config.write_timeout));
        Self {
            config: Arc::new(config),
            relay,
            started_at: Utc::now(),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        self.relay.registry()
    }

    /// WebSocket upgrade on `/`, plus `/health` and `/status`
    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let ws_route = warp::path::end()
            .and(warp::ws())
            .and(warp::addr::remote())
            .and(with_relay(self.relay.clone()))
            .and(with_config(self.config.clone()))
            .map(
                |ws: warp::ws::Ws,
                 remote_addr: Option<SocketAddr>,
                 relay: SharedRelayEngine,
                 config: Arc<ServerConfig>| {
                    debug!("New websocket connection");
                    ws.on_upgrade(move |socket| {
                        handle_ws_client(socket, remote_addr, relay, config)
                    })
                },
            );

        let health_route = warp::path(HEALTH_PATH)
            .and(warp::path::end())
            .and(warp::get())
            .map(|| "OK");

        let started_at = self.started_at;
        let status_route = warp::path(STATUS_PATH)
            .and(warp::path::end())
            .and(warp::get())
            .and(with_relay(self.relay.clone()))
            .and_then(move |relay| handle_status(relay, started_at));

        ws_route.or(health_route).or(status_route)
    }

    /// Bind the listener and return the bound address with the serving future.
    ///
    /// The future runs until `signal` resolves, then stops accepting, closes
    /// every registered connection and waits for them to go away for at most
    /// the configured shutdown timeout. Binding errors are returned here.
    pub fn bind<S>(&self, signal: S) -> Result<(SocketAddr, impl Future<Output = ()>)>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.socket_addr()?;
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (bound, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(addr, async move {
                let _ = stop_rx.await;
            })?;

        let relay = self.relay.clone();
        let shutdown_timeout = self.config.shutdown_timeout;

        let run = async move {
            tokio::pin!(server);
            tokio::select! {
                _ = &mut server => {
                    warn!("Listener stopped before a shutdown was requested");
                    return;
                }
                _ = signal => {}
            }

            info!("Shutting down relay server...");
            let _ = stop_tx.send(());
            let closing = relay.close_all().await;
            info!("Closing {} connections", closing);

            let drained = tokio::time::timeout(shutdown_timeout, async {
                tokio::join!(relay.registry().wait_until_empty(), &mut server);
            })
            .await;
            if drained.is_err() {
                warn!(
                    "Shutdown timeout elapsed with {} connections still open",
                    relay.registry().len().await
                );
            }
            info!("Relay server stopped");
        };

        Ok((bound, run))
    }
}

// Helper functions to include shared state in requests
fn with_relay(
    relay: SharedRelayEngine,
) -> impl Filter<Extract = (SharedRelayEngine,), Error = Infallible> + Clone {
    warp::any().map(move || relay.clone())
}

fn with_config(
    config: Arc<ServerConfig>,
) -> impl Filter<Extract = (Arc<ServerConfig>,), Error = Infallible> + Clone {
    warp::any().map(move || config.clone())
}
