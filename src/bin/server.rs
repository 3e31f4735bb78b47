use log::{error, info, warn};

use motion_relay::config::ServerConfig;
use motion_relay::server::RelayServer;
use motion_relay::shutdown::wait_for_shutdown_signal;

#[tokio::main]
async fn main() {
    // Initialize env before logging so RUST_LOG can come from .env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("No .env file loaded: {}", e),
    };

    // Load config from the environment
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration: host={}, port={}", config.host, config.port);

    let server = RelayServer::new(config);

    let (addr, serving) = match server.bind(wait_for_shutdown_signal()) {
        Ok(bound) => bound,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Motion Relay server running on {}", addr);
    info!("WebSocket URL: ws://{}/", addr);

    serving.await;
}
