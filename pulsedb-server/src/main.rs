//! PulseDB Server - HTTP API for the time-series engine

mod api;

use pulsedb_core::{Engine, EngineConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Data directory
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".parse().unwrap(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl ServerConfig {
    /// Configuration from the environment, with defaults
    fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("PULSEDB_HTTP_ADDR") {
            config.http_addr = addr.parse()?;
        }
        if let Ok(dir) = std::env::var("PULSEDB_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;

    info!("Starting PulseDB server...");
    info!("Data directory: {:?}", config.data_dir);
    info!("HTTP server: http://{}", config.http_addr);

    let engine = Engine::open(EngineConfig::new(&config.data_dir))?;
    let engine = Arc::new(engine);

    let app = api::create_router(engine.clone());

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("PulseDB server listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    engine.close()?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install shutdown signal handler");
}
