use async_trait::async_trait;
use bytes::Bytes;

use super::copy::CopyError;
use crate::data::{AppId, CounterId, CounterValue, DayWindow};

/// Table holding the name-to-id mapping.
pub const NAMES_TABLE: &str = "CounterNames";
/// Table holding the samples. Spelling matches existing deployments.
pub const SAMPLES_TABLE: &str = "PerfomanceCounterValues";

/// Row filter for a single-day sample query.
#[derive(Debug, Clone, Copy)]
pub struct SampleFilter {
    pub counter_id: CounterId,
    /// `None` matches every application.
    pub app_id: Option<AppId>,
    pub window: DayWindow,
    pub skip: usize,
}

/// A relational engine the counter store can talk to.
///
/// `connect` hands out a fresh connection per call. Dropping the connection
/// releases it.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn CounterConnection>, BackendError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// One open connection to a [`CounterBackend`].
#[async_trait]
pub trait CounterConnection: Send {
    /// Run a (possibly multi-statement) schema script.
    async fn execute_script(&mut self, script: &str) -> Result<(), BackendError>;

    /// Id stored for `name`, if the mapping row exists.
    async fn find_counter_id(&mut self, name: &str) -> Result<Option<CounterId>, BackendError>;

    /// Insert a mapping row. Returns `false` when a uniqueness constraint
    /// rejected it (the name or the id is already taken).
    async fn insert_counter_name(&mut self, id: CounterId, name: &str)
        -> Result<bool, BackendError>;

    /// Stream a binary COPY payload into the samples table. Returns the
    /// number of rows accepted.
    async fn copy_samples(&mut self, payload: Bytes) -> Result<u64, BackendError>;

    /// Samples matching `filter`, ascending by timestamp, after skipping.
    async fn select_samples(
        &mut self,
        filter: &SampleFilter,
    ) -> Result<Vec<CounterValue>, BackendError>;

    /// Every mapping row.
    async fn counter_names(&mut self) -> Result<Vec<(CounterId, String)>, BackendError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("relation \"{0}\" does not exist")]
    MissingRelation(String),

    #[error("relation \"{0}\" already exists")]
    RelationExists(String),

    #[error("schema script error: {0}")]
    Script(String),

    #[error("copy data error: {0}")]
    Copy(#[from] CopyError),

    #[error("unsupported connection string '{0}'")]
    UnsupportedScheme(String),

    #[error("database error: {0}")]
    Database(String),
}
