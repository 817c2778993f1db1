//! kumasync - live heartbeat sync and downtime analytics for uptime monitors.
//!
//! Serves heartbeat lists and downtime statistics to connected web clients
//! over WebSocket, reading from the monitor database.

mod broadcast;
mod config;
mod db;
mod downtime;
mod session;
mod web;

use config::ServerConfig;
use db::Store;
use session::SessionRouter;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("kumasync=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting kumasync on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);
    tracing::info!(
        "Heartbeat list limit {}, important list limit {}",
        cfg.heartbeat_list_limit,
        cfg.important_list_limit
    );

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let router = Arc::new(SessionRouter::new());

    // Start web server
    let server = Server::new(cfg, store, router);
    server.start().await?;

    Ok(())
}
