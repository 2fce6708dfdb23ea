use axum::{
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    counter_values, health_check, list_counters, recent_errors, store_counters, AppState,
};
use crate::config::StoreConfig;
use crate::store::CounterStore;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    /// PERFSTORE_HOST=0.0.0.0
    /// PERFSTORE_PORT=8080
    /// plus the store variables read by [`StoreConfig::from_env`]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = std::env::var("PERFSTORE_HOST").unwrap_or(defaults.host);
        let port = std::env::var("PERFSTORE_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        Self {
            host,
            port,
            store: StoreConfig::from_env(),
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Counters
        .route("/counters", get(list_counters))
        .route("/counters", post(store_counters))
        .route("/counters/:name/values", get(counter_values))
        // Error channel
        .route("/errors", get(recent_errors))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(CounterStore::from_config(&config.store)?);
    tracing::info!("Counter store backend: {}", store.backend_name());

    let state = Arc::new(AppState { store });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting perfstore server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("perfstore server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
