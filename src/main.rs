//! perfstore Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - PERFSTORE_HOST: Bind address (default: 0.0.0.0)
//! - PERFSTORE_PORT: Port number (default: 8080)
//! - PERFSTORE_DATABASE_URL: Backend connection string (default: memory://)
//! - PERFSTORE_SCHEMA_FILE: Schema script to use instead of the embedded one
//! - PERFSTORE_ERROR_LOG_CAPACITY: Buffered error events (default: 256)
//! - RUST_LOG: Log level (default: info)

use perfstore::api::{run_server, ServerConfig};
use perfstore::SchemaSource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "perfstore=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    let backend = config
        .store
        .connection_string
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .unwrap_or("unknown");
    let schema = match &config.store.schema {
        SchemaSource::Embedded => "embedded".to_string(),
        SchemaSource::File(path) => path.display().to_string(),
        SchemaSource::Inline(_) => "inline".to_string(),
    };

    tracing::info!("perfstore configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Backend: {}", backend);
    tracing::info!("  Schema script: {}", schema);
    tracing::info!("  Error log capacity: {}", config.store.error_log_capacity);

    run_server(config).await
}
