use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::backend::BackendError;

/// Idempotent schema script compiled into the binary.
pub const EMBEDDED_SCHEMA: &str = include_str!("../../sql/db_structure.sql");

/// Where the schema bootstrap script comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SchemaSource {
    #[default]
    Embedded,
    File(PathBuf),
    Inline(String),
}

impl SchemaSource {
    /// Read the script text. Empty scripts are rejected.
    pub async fn load(&self) -> Result<String, SchemaError> {
        let (script, origin) = match self {
            SchemaSource::Embedded => (EMBEDDED_SCHEMA.to_string(), "embedded".to_string()),
            SchemaSource::File(path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|source| {
                    SchemaError::Unreadable {
                        path: path.clone(),
                        source,
                    }
                })?;
                (text, path.display().to_string())
            }
            SchemaSource::Inline(text) => (text.clone(), "inline".to_string()),
        };

        if script.trim().is_empty() {
            return Err(SchemaError::Empty(origin));
        }
        Ok(script)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema script {path} unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("schema script ({0}) is empty")]
    Empty(String),

    #[error("schema script failed: {0}")]
    Execution(#[from] BackendError),
}
