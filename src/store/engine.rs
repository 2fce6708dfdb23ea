use chrono::{Local, NaiveDateTime};
use std::sync::Arc;

use super::bootstrap::SchemaBootstrap;
use super::error::StoreError;
use super::events::ErrorChannel;
use super::query::CounterQuery;
use super::resolver::IdResolver;
use crate::config::StoreConfig;
use crate::data::{AppId, CounterInput, CounterValue, SampleRow};
use crate::storage::{
    encode_rows, open_backend, BackendError, CounterBackend, CounterConnection, SampleFilter,
};

/// Performance counter store.
///
/// Public operations never fail from the caller's point of view: errors are
/// reported on [`CounterStore::errors`] and the operation completes with an
/// empty result. Every call opens its own backend connection and drops it
/// before returning.
pub struct CounterStore {
    backend: Arc<dyn CounterBackend>,
    resolver: IdResolver,
    bootstrap: SchemaBootstrap,
    errors: ErrorChannel,
}

impl CounterStore {
    pub fn new(backend: Arc<dyn CounterBackend>, config: &StoreConfig) -> Self {
        Self {
            backend,
            resolver: IdResolver::new(),
            bootstrap: SchemaBootstrap::new(config.schema.clone()),
            errors: ErrorChannel::new(config.error_log_capacity),
        }
    }

    /// Build a store with the backend named by the connection string.
    pub fn from_config(config: &StoreConfig) -> Result<Self, BackendError> {
        let backend = open_backend(&config.connection_string)?;
        Ok(Self::new(backend, config))
    }

    pub fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    pub fn resolver(&self) -> &IdResolver {
        &self.resolver
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrap.is_done()
    }

    /// Persist a batch of samples sharing one timestamp and one application.
    ///
    /// `timestamp` defaults to the local time of the call, `app_id` to
    /// [`AppId::UNSPECIFIED`].
    pub async fn store_counters(
        &self,
        counters: &[CounterInput],
        timestamp: Option<NaiveDateTime>,
        app_id: Option<AppId>,
    ) {
        match self.try_store(counters, timestamp, app_id).await {
            Ok(0) => {}
            Ok(written) => tracing::debug!(rows = written, "Stored counter samples"),
            Err(error) => self.errors.report("store", &error),
        }
    }

    /// Samples of one counter for one day, ascending by timestamp.
    pub async fn query_counter_values(&self, query: &CounterQuery) -> Vec<CounterValue> {
        match self.try_query(query).await {
            Ok(values) => values,
            Err(error) => {
                self.errors.report("query", &error);
                Vec::new()
            }
        }
    }

    /// Every counter name in the mapping table.
    pub async fn counter_names(&self) -> Vec<String> {
        match self.try_list().await {
            Ok(names) => names,
            Err(error) => {
                self.errors.report("list", &error);
                Vec::new()
            }
        }
    }

    /// Connect and make sure the schema was bootstrapped. A bootstrap
    /// failure is reported but does not stop the operation.
    async fn open(&self, operation: &'static str) -> Result<Box<dyn CounterConnection>, StoreError> {
        let mut conn = self
            .backend
            .connect()
            .await
            .map_err(StoreError::Connection)?;

        if let Err(error) = self.bootstrap.ensure(conn.as_mut()).await {
            self.errors.report(operation, &StoreError::Schema(error));
        }
        Ok(conn)
    }

    async fn try_store(
        &self,
        counters: &[CounterInput],
        timestamp: Option<NaiveDateTime>,
        app_id: Option<AppId>,
    ) -> Result<usize, StoreError> {
        if counters.is_empty() {
            return Ok(0);
        }

        let timestamp = timestamp.unwrap_or_else(|| Local::now().naive_local());
        let app_id = app_id.unwrap_or_default();
        let names: Vec<&str> = counters.iter().map(|c| c.name.as_str()).collect();

        // One miss sends the whole batch down the slow path
        let cached = self.resolver.cached_ids(names.iter().copied());
        let mut conn = self.open("store").await?;
        let ids = match cached {
            Some(ids) => ids,
            None => self.resolver.resolve_all(conn.as_mut(), &names).await?,
        };

        let rows: Vec<SampleRow> = counters
            .iter()
            .zip(ids)
            .map(|(counter, counter_id)| SampleRow {
                app_id,
                counter_id,
                timestamp,
                value: counter.value,
            })
            .collect();

        let payload =
            encode_rows(&rows).map_err(|error| StoreError::BulkTransfer(error.into()))?;
        let written = conn
            .copy_samples(payload)
            .await
            .map_err(StoreError::BulkTransfer)?;

        if written != rows.len() as u64 {
            return Err(StoreError::ShortWrite {
                written,
                expected: rows.len(),
            });
        }
        Ok(rows.len())
    }

    async fn try_query(&self, query: &CounterQuery) -> Result<Vec<CounterValue>, StoreError> {
        let mut conn = self.open("query").await?;

        let counter_id = match self
            .resolver
            .lookup(conn.as_mut(), &query.name)
            .await
            .map_err(StoreError::Query)?
        {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };

        let filter = SampleFilter {
            counter_id,
            app_id: query.app_id,
            window: query.window(),
            skip: query.skip,
        };
        conn.select_samples(&filter)
            .await
            .map_err(StoreError::Query)
    }

    async fn try_list(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.open("list").await?;
        let rows = conn.counter_names().await.map_err(StoreError::Query)?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| {
                self.resolver.remember(&name, id);
                name
            })
            .collect())
    }
}
