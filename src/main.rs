//! growsock - Game Server
//!
//! A datagram game server that greets connecting peers and answers with
//! variant call-function packets.

use growsock_protocol::GameMessage;
use growsock_server::events::next_event;
use growsock_server::{http, Config, Server, ServerEvent};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if GROWSOCK_CONFIG is set, then env overrides)
    let config_path = std::env::var("GROWSOCK_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(path) = &config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    tracing::info!("Starting growsock server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max peers: {}", config.network.max_peers);
    tracing::info!("  Idle timeout: {}s", config.network.idle_timeout_secs);

    let server = Arc::new(Server::new(config.clone()));

    // Spawn the server_data endpoint
    let http_handle = if config.http.enabled {
        let shutdown_rx = server.subscribe_shutdown();
        let http_config = config.http.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = http::run_http_server(http_config, shutdown_rx).await {
                tracing::error!("HTTP server error: {}", e);
            }
        }))
    } else {
        tracing::info!("  HTTP endpoint: disabled");
        None
    };

    // Spawn event handler
    let mut events = server.subscribe();
    let event_server = server.clone();
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            match event {
                ServerEvent::Connect { net_id } => {
                    let hello = GameMessage::hello().encode().freeze();
                    if let Err(e) = event_server.send(net_id, &[hello]).await {
                        tracing::warn!("[{}] Failed to send hello: {}", net_id, e);
                    }
                }
                ServerEvent::Data { net_id, data } => match GameMessage::decode(&data) {
                    Ok(message) => {
                        tracing::debug!("[{}] {:?} message", net_id, message.message_type());
                    }
                    Err(e) => {
                        tracing::warn!("[{}] Malformed message: {}", net_id, e);
                    }
                },
                ServerEvent::Disconnect { net_id } => {
                    tracing::debug!("[{}] Peer left", net_id);
                }
            }
        }
    });

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.listen().await?;

    if let Some(handle) = http_handle {
        let _ = handle.await;
    }

    tracing::info!("Server stopped");
    Ok(())
}
