use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::{BackendError, SchemaError};

/// Failure categories reported on the error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Schema,
    Resolution,
    BulkTransfer,
    Query,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Schema => "schema",
            ErrorKind::Resolution => "resolution",
            ErrorKind::BulkTransfer => "bulk_transfer",
            ErrorKind::Query => "query",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(BackendError),

    #[error("schema bootstrap failed: {0}")]
    Schema(#[from] SchemaError),

    #[error("resolving counter '{name}' failed: {source}")]
    Resolution { name: String, source: BackendError },

    #[error("no free counter id left for '{0}'")]
    IdSpaceExhausted(String),

    #[error("bulk transfer failed: {0}")]
    BulkTransfer(BackendError),

    #[error("bulk transfer wrote {written} of {expected} rows")]
    ShortWrite { written: u64, expected: usize },

    #[error("query failed: {0}")]
    Query(BackendError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Connection(_) => ErrorKind::Connection,
            StoreError::Schema(_) => ErrorKind::Schema,
            StoreError::Resolution { .. } | StoreError::IdSpaceExhausted(_) => {
                ErrorKind::Resolution
            }
            StoreError::BulkTransfer(_) | StoreError::ShortWrite { .. } => ErrorKind::BulkTransfer,
            StoreError::Query(_) => ErrorKind::Query,
        }
    }
}
