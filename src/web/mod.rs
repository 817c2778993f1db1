//! Web server module.

mod handlers;

pub use handlers::*;

use crate::broadcast::{AccountLists, HeartbeatBroadcaster, ListLimits};
use crate::config::ServerConfig;
use crate::db::Store;
use crate::session::SessionRouter;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub router: Arc<SessionRouter>,
    pub broadcaster: HeartbeatBroadcaster,
    pub lists: AccountLists,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<Store>, router: Arc<SessionRouter>) -> Self {
        let limits = ListLimits::from(&config);
        let broadcaster = HeartbeatBroadcaster::new(store.clone(), router.clone(), limits);
        let lists = AccountLists::new(store, router.clone(), config.clone());
        Self {
            config,
            router,
            broadcaster,
            lists,
        }
    }
}

/// Web server for kumasync.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>, router: Arc<SessionRouter>) -> Self {
        Self {
            state: AppState::new(config, store, router),
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/ws", get(handlers::handle_ws))
            .route("/api/downtime", get(handlers::handle_get_downtime))
            .route("/healthz", get(handlers::handle_health))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
