pub mod backend;
pub mod copy;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod schema;

pub use backend::{
    BackendError, CounterBackend, CounterConnection, SampleFilter, NAMES_TABLE, SAMPLES_TABLE,
};
pub use copy::{decode_rows, encode_rows, CopyError};
pub use memory::{FailPoint, MemoryBackend};
#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;
pub use schema::{SchemaError, SchemaSource, EMBEDDED_SCHEMA};

use std::sync::Arc;

/// Pick a backend from the connection string scheme.
///
/// `memory://` gives a fresh in-process database; `postgres://` and
/// `postgresql://` connect to PostgreSQL when the `postgres` feature is on.
pub fn open_backend(connection_string: &str) -> Result<Arc<dyn CounterBackend>, BackendError> {
    let scheme = connection_string
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .unwrap_or_default();

    match scheme.as_str() {
        "memory" => Ok(Arc::new(MemoryBackend::new())),
        "postgres" | "postgresql" => {
            #[cfg(feature = "postgres")]
            {
                Ok(Arc::new(PostgresBackend::new(connection_string)))
            }
            #[cfg(not(feature = "postgres"))]
            {
                Err(BackendError::UnsupportedScheme(format!(
                    "{} (postgres feature not enabled)",
                    scheme
                )))
            }
        }
        _ => Err(BackendError::UnsupportedScheme(redact(connection_string))),
    }
}

/// Drop everything after the scheme so credentials never reach logs.
fn redact(connection_string: &str) -> String {
    match connection_string.split_once("://") {
        Some((scheme, _)) => format!("{}://…", scheme),
        None => "<no scheme>".to_string(),
    }
}
