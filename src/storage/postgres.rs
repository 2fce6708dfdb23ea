//! PostgreSQL backend over sqlx. One physical connection per `connect`.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDateTime;
use sqlx::{Connection, PgConnection};

use super::backend::{
    BackendError, CounterBackend, CounterConnection, SampleFilter, NAMES_TABLE, SAMPLES_TABLE,
};
use crate::data::{AppId, CounterId, CounterValue};

#[derive(Debug, Clone)]
pub struct PostgresBackend {
    url: String,
}

impl PostgresBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl CounterBackend for PostgresBackend {
    async fn connect(&self) -> Result<Box<dyn CounterConnection>, BackendError> {
        let conn = PgConnection::connect(&self.url)
            .await
            .map_err(|error| BackendError::Connect(error.to_string()))?;
        Ok(Box::new(PostgresConnection { conn }))
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

struct PostgresConnection {
    conn: PgConnection,
}

fn db_error(context: &str, error: sqlx::Error) -> BackendError {
    BackendError::Database(format!("{context}: {error}"))
}

#[async_trait]
impl CounterConnection for PostgresConnection {
    async fn execute_script(&mut self, script: &str) -> Result<(), BackendError> {
        sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(script))
            .await
            .map_err(|error| BackendError::Script(error.to_string()))?;
        Ok(())
    }

    async fn find_counter_id(&mut self, name: &str) -> Result<Option<CounterId>, BackendError> {
        let query = format!(r#"SELECT "Id" FROM "{NAMES_TABLE}" WHERE "Name" = $1"#);
        let id: Option<i16> = sqlx::query_scalar(&query)
            .bind(name)
            .fetch_optional(&mut self.conn)
            .await
            .map_err(|error| db_error("counter id lookup failed", error))?;
        Ok(id.map(CounterId::from_raw))
    }

    async fn insert_counter_name(
        &mut self,
        id: CounterId,
        name: &str,
    ) -> Result<bool, BackendError> {
        let insert = format!(
            r#"INSERT INTO "{NAMES_TABLE}" ("Id", "Name") VALUES ($1, $2) ON CONFLICT DO NOTHING"#
        );
        let result = sqlx::query(&insert)
            .bind(id.get())
            .bind(name)
            .execute(&mut self.conn)
            .await
            .map_err(|error| db_error("counter name insert failed", error))?;
        Ok(result.rows_affected() == 1)
    }

    async fn copy_samples(&mut self, payload: Bytes) -> Result<u64, BackendError> {
        let statement = format!(
            r#"COPY "{SAMPLES_TABLE}" ("AppId", "CounterId", "Timestamp", "Value") FROM STDIN (FORMAT BINARY)"#
        );
        let mut copy = self
            .conn
            .copy_in_raw(&statement)
            .await
            .map_err(|error| db_error("copy start failed", error))?;

        let sent = copy.send(payload).await.map(|_| ());
        if let Err(error) = sent {
            // The connection is discarded after this call either way
            let _ = copy.abort(error.to_string()).await;
            return Err(db_error("copy send failed", error));
        }

        copy.finish()
            .await
            .map_err(|error| db_error("copy finish failed", error))
    }

    async fn select_samples(
        &mut self,
        filter: &SampleFilter,
    ) -> Result<Vec<CounterValue>, BackendError> {
        let query = format!(
            r#"SELECT "Timestamp", "Value" FROM "{SAMPLES_TABLE}"
WHERE "CounterId" = $1 AND ($2::smallint IS NULL OR "AppId" = $2)
AND "Timestamp" >= $3 AND "Timestamp" < $4
ORDER BY "Timestamp" OFFSET $5"#
        );
        let rows: Vec<(NaiveDateTime, f32)> = sqlx::query_as(&query)
            .bind(filter.counter_id.get())
            .bind(filter.app_id.map(AppId::get))
            .bind(filter.window.start)
            .bind(filter.window.end)
            .bind(i64::try_from(filter.skip).unwrap_or(i64::MAX))
            .fetch_all(&mut self.conn)
            .await
            .map_err(|error| db_error("sample query failed", error))?;

        Ok(rows
            .into_iter()
            .map(|(timestamp, value)| CounterValue::new(timestamp, value))
            .collect())
    }

    async fn counter_names(&mut self) -> Result<Vec<(CounterId, String)>, BackendError> {
        let query = format!(r#"SELECT "Id", "Name" FROM "{NAMES_TABLE}""#);
        let rows: Vec<(i16, String)> = sqlx::query_as(&query)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|error| db_error("counter list failed", error))?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| (CounterId::from_raw(id), name))
            .collect())
    }
}
