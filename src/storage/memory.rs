//! In-process backend emulating the two counter tables.
//!
//! Schema scripts are parsed with the PostgreSQL dialect and applied as a
//! unit. Data operations fail with a missing-relation error until the script
//! has created the table they touch, the same way a fresh database does.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use sqlparser::ast::{ObjectName, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::backend::{
    BackendError, CounterBackend, CounterConnection, SampleFilter, NAMES_TABLE, SAMPLES_TABLE,
};
use super::copy::decode_rows;
use crate::data::{CounterId, CounterValue, SampleRow};

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Connect,
    Script,
    Lookup,
    Insert,
    Copy,
    Select,
    List,
}

#[derive(Debug, Default)]
struct NameTable {
    by_id: BTreeMap<CounterId, String>,
    by_name: HashMap<String, CounterId>,
}

#[derive(Debug)]
enum Relation {
    Names(NameTable),
    Samples(Vec<SampleRow>),
    Other,
}

impl Relation {
    fn for_table(name: &str) -> Self {
        match name {
            NAMES_TABLE => Relation::Names(NameTable::default()),
            SAMPLES_TABLE => Relation::Samples(Vec::new()),
            _ => Relation::Other,
        }
    }
}

#[derive(Debug, Default)]
struct Database {
    relations: RwLock<HashMap<String, Relation>>,
    indexes: RwLock<HashSet<String>>,
    fail_points: Mutex<HashSet<FailPoint>>,
    opened: AtomicUsize,
    open: AtomicUsize,
}

impl Database {
    fn check(&self, point: FailPoint) -> Result<(), BackendError> {
        if !self.fail_points.lock().contains(&point) {
            return Ok(());
        }
        let message = format!("injected failure at {:?}", point);
        Err(match point {
            FailPoint::Connect => BackendError::Connect(message),
            FailPoint::Script => BackendError::Script(message),
            _ => BackendError::Database(message),
        })
    }
}

/// Cloning shares the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    db: Arc<Database>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call hitting `point` fail until healed.
    pub fn fail(&self, point: FailPoint) {
        self.db.fail_points.lock().insert(point);
    }

    pub fn heal(&self, point: FailPoint) {
        self.db.fail_points.lock().remove(&point);
    }

    /// Total connections handed out so far.
    pub fn connections_opened(&self) -> usize {
        self.db.opened.load(Ordering::SeqCst)
    }

    /// Connections not yet dropped.
    pub fn open_connections(&self) -> usize {
        self.db.open.load(Ordering::SeqCst)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.db.relations.read().contains_key(name)
    }

    /// Snapshot of the samples table in insertion order.
    pub fn sample_rows(&self) -> Vec<SampleRow> {
        match self.db.relations.read().get(SAMPLES_TABLE) {
            Some(Relation::Samples(rows)) => rows.clone(),
            _ => Vec::new(),
        }
    }

    /// Snapshot of the mapping table ordered by id.
    pub fn mapping_rows(&self) -> Vec<(CounterId, String)> {
        match self.db.relations.read().get(NAMES_TABLE) {
            Some(Relation::Names(table)) => table
                .by_id
                .iter()
                .map(|(id, name)| (*id, name.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl CounterBackend for MemoryBackend {
    async fn connect(&self) -> Result<Box<dyn CounterConnection>, BackendError> {
        self.db.check(FailPoint::Connect)?;
        self.db.opened.fetch_add(1, Ordering::SeqCst);
        self.db.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            db: Arc::clone(&self.db),
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

pub struct MemoryConnection {
    db: Arc<Database>,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.db.open.fetch_sub(1, Ordering::SeqCst);
    }
}

fn object_name(name: &ObjectName) -> String {
    name.0.iter().map(|i| i.value.clone()).collect::<Vec<_>>().join(".")
}

fn missing(table: &str) -> BackendError {
    BackendError::MissingRelation(table.to_string())
}

fn names_table<'a>(
    relations: &'a HashMap<String, Relation>,
) -> Result<&'a NameTable, BackendError> {
    match relations.get(NAMES_TABLE) {
        Some(Relation::Names(table)) => Ok(table),
        _ => Err(missing(NAMES_TABLE)),
    }
}

#[async_trait]
impl CounterConnection for MemoryConnection {
    async fn execute_script(&mut self, script: &str) -> Result<(), BackendError> {
        self.db.check(FailPoint::Script)?;
        let statements = Parser::parse_sql(&PostgreSqlDialect {}, script)
            .map_err(|e| BackendError::Script(e.to_string()))?;

        let mut relations = self.db.relations.write();
        let mut indexes = self.db.indexes.write();
        let mut created: Vec<String> = Vec::new();
        let mut created_indexes: Vec<String> = Vec::new();
        let exists = |created: &Vec<String>, table: &str| {
            relations.contains_key(table) || created.iter().any(|c| c == table)
        };

        // Validate everything first so a failing script leaves no trace
        for statement in &statements {
            match statement {
                Statement::CreateTable {
                    name,
                    if_not_exists,
                    ..
                } => {
                    let table = object_name(name);
                    if exists(&created, &table) {
                        if *if_not_exists {
                            continue;
                        }
                        return Err(BackendError::RelationExists(table));
                    }
                    created.push(table);
                }
                Statement::CreateIndex {
                    name,
                    table_name,
                    if_not_exists,
                    ..
                } => {
                    let table = object_name(table_name);
                    if !exists(&created, &table) {
                        return Err(missing(&table));
                    }
                    // Unnamed indexes get a generated name, so they never clash
                    let Some(index) = name.as_ref().map(object_name) else {
                        continue;
                    };
                    if indexes.contains(&index) || created_indexes.contains(&index) {
                        if *if_not_exists {
                            continue;
                        }
                        return Err(BackendError::RelationExists(index));
                    }
                    created_indexes.push(index);
                }
                other => {
                    return Err(BackendError::Script(format!(
                        "unsupported statement: {}",
                        other
                    )));
                }
            }
        }

        for table in created {
            tracing::debug!(table = %table, "memory backend created relation");
            let relation = Relation::for_table(&table);
            relations.insert(table, relation);
        }
        indexes.extend(created_indexes);
        Ok(())
    }

    async fn find_counter_id(&mut self, name: &str) -> Result<Option<CounterId>, BackendError> {
        self.db.check(FailPoint::Lookup)?;
        let relations = self.db.relations.read();
        Ok(names_table(&relations)?.by_name.get(name).copied())
    }

    async fn insert_counter_name(
        &mut self,
        id: CounterId,
        name: &str,
    ) -> Result<bool, BackendError> {
        self.db.check(FailPoint::Insert)?;
        let mut relations = self.db.relations.write();
        let table = match relations.get_mut(NAMES_TABLE) {
            Some(Relation::Names(table)) => table,
            _ => return Err(missing(NAMES_TABLE)),
        };

        if table.by_id.contains_key(&id) || table.by_name.contains_key(name) {
            return Ok(false);
        }
        table.by_id.insert(id, name.to_string());
        table.by_name.insert(name.to_string(), id);
        Ok(true)
    }

    async fn copy_samples(&mut self, payload: Bytes) -> Result<u64, BackendError> {
        self.db.check(FailPoint::Copy)?;
        let rows = decode_rows(&payload)?;

        let mut relations = self.db.relations.write();
        match relations.get_mut(SAMPLES_TABLE) {
            Some(Relation::Samples(samples)) => {
                let count = rows.len() as u64;
                samples.extend(rows);
                Ok(count)
            }
            _ => Err(missing(SAMPLES_TABLE)),
        }
    }

    async fn select_samples(
        &mut self,
        filter: &SampleFilter,
    ) -> Result<Vec<CounterValue>, BackendError> {
        self.db.check(FailPoint::Select)?;
        let relations = self.db.relations.read();
        let samples = match relations.get(SAMPLES_TABLE) {
            Some(Relation::Samples(samples)) => samples,
            _ => return Err(missing(SAMPLES_TABLE)),
        };

        let mut matched: Vec<&SampleRow> = samples
            .iter()
            .filter(|row| row.counter_id == filter.counter_id)
            .filter(|row| filter.app_id.map_or(true, |app| row.app_id == app))
            .filter(|row| filter.window.contains(row.timestamp))
            .collect();
        matched.sort_by_key(|row| row.timestamp);

        Ok(matched
            .into_iter()
            .skip(filter.skip)
            .map(|row| CounterValue::new(row.timestamp, row.value))
            .collect())
    }

    async fn counter_names(&mut self) -> Result<Vec<(CounterId, String)>, BackendError> {
        self.db.check(FailPoint::List)?;
        let relations = self.db.relations.read();
        Ok(names_table(&relations)?
            .by_id
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AppId, DayWindow};
    use crate::storage::copy::encode_rows;
    use crate::storage::schema::EMBEDDED_SCHEMA;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn sample(app: i16, counter: i16, timestamp: NaiveDateTime, value: f32) -> SampleRow {
        SampleRow {
            app_id: AppId::new(app),
            counter_id: CounterId::from_raw(counter),
            timestamp,
            value,
        }
    }

    async fn bootstrapped() -> (MemoryBackend, Box<dyn CounterConnection>) {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();
        conn.execute_script(EMBEDDED_SCHEMA).await.unwrap();
        (backend, conn)
    }

    #[tokio::test]
    async fn test_embedded_schema_is_idempotent() {
        let (backend, mut conn) = bootstrapped().await;
        conn.execute_script(EMBEDDED_SCHEMA).await.unwrap();

        assert!(backend.has_table(NAMES_TABLE));
        assert!(backend.has_table(SAMPLES_TABLE));
    }

    #[tokio::test]
    async fn test_plain_create_twice_fails() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();
        let script = r#"CREATE TABLE "Things" ("Id" smallint);"#;

        conn.execute_script(script).await.unwrap();
        assert!(matches!(
            conn.execute_script(script).await,
            Err(BackendError::RelationExists(_))
        ));
    }

    #[tokio::test]
    async fn test_plain_index_twice_fails() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();
        let script = r#"
            CREATE TABLE IF NOT EXISTS "Things" ("Id" smallint);
            CREATE INDEX "IX_Things" ON "Things" ("Id");
        "#;

        conn.execute_script(script).await.unwrap();
        assert!(matches!(
            conn.execute_script(script).await,
            Err(BackendError::RelationExists(name)) if name == "IX_Things"
        ));
    }

    #[tokio::test]
    async fn test_index_if_not_exists_is_rerunnable() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();
        let script = r#"
            CREATE TABLE IF NOT EXISTS "Things" ("Id" smallint);
            CREATE INDEX IF NOT EXISTS "IX_Things" ON "Things" ("Id");
        "#;

        conn.execute_script(script).await.unwrap();
        conn.execute_script(script).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_index_within_one_script_fails() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();
        let script = r#"
            CREATE TABLE "Things" ("Id" smallint);
            CREATE INDEX "IX_Things" ON "Things" ("Id");
            CREATE INDEX "IX_Things" ON "Things" ("Id");
        "#;

        assert!(conn.execute_script(script).await.is_err());
        assert!(!backend.has_table("Things"));
    }

    #[tokio::test]
    async fn test_failed_script_creates_nothing() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();
        let script = r#"
            CREATE TABLE IF NOT EXISTS "CounterNames" ("Id" smallint PRIMARY KEY, "Name" varchar(255));
            CREATE INDEX IF NOT EXISTS "IX_Missing" ON "Nowhere" ("Id");
        "#;

        assert!(matches!(
            conn.execute_script(script).await,
            Err(BackendError::MissingRelation(_))
        ));
        assert!(!backend.has_table(NAMES_TABLE));
    }

    #[tokio::test]
    async fn test_unsupported_statement_rejected() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();
        assert!(matches!(
            conn.execute_script("DROP TABLE \"CounterNames\"").await,
            Err(BackendError::Script(_))
        ));
    }

    #[tokio::test]
    async fn test_data_ops_need_schema() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();

        assert!(matches!(
            conn.find_counter_id("cpu").await,
            Err(BackendError::MissingRelation(_))
        ));
        let payload = encode_rows(&[]).unwrap();
        assert!(matches!(
            conn.copy_samples(payload).await,
            Err(BackendError::MissingRelation(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_respects_uniqueness() {
        let (backend, mut conn) = bootstrapped().await;
        let id = CounterId::from_raw(5);

        assert!(conn.insert_counter_name(id, "cpu").await.unwrap());
        // Same name, other id
        assert!(!conn
            .insert_counter_name(CounterId::from_raw(6), "cpu")
            .await
            .unwrap());
        // Same id, other name
        assert!(!conn.insert_counter_name(id, "mem").await.unwrap());

        assert_eq!(conn.find_counter_id("cpu").await.unwrap(), Some(id));
        assert_eq!(backend.mapping_rows(), vec![(id, "cpu".to_string())]);
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_skips() {
        let (_backend, mut conn) = bootstrapped().await;
        let rows = vec![
            sample(0, 1, ts(10, 12, 0, 0), 3.0),
            sample(0, 1, ts(10, 8, 0, 0), 1.0),
            sample(1, 1, ts(10, 9, 0, 0), 2.0),
            sample(0, 2, ts(10, 9, 30, 0), 99.0),
            sample(0, 1, ts(11, 0, 0, 0), 100.0),
            sample(0, 1, ts(9, 23, 59, 59), -1.0),
        ];
        assert_eq!(conn.copy_samples(encode_rows(&rows).unwrap()).await.unwrap(), 6);

        let mut filter = SampleFilter {
            counter_id: CounterId::from_raw(1),
            app_id: None,
            window: DayWindow::for_date(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()),
            skip: 0,
        };
        let values: Vec<f32> = conn
            .select_samples(&filter)
            .await
            .unwrap()
            .iter()
            .map(|v| v.value)
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);

        filter.skip = 2;
        let skipped = conn.select_samples(&filter).await.unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].value, 3.0);

        filter.skip = 0;
        filter.app_id = Some(AppId::new(1));
        let app_only = conn.select_samples(&filter).await.unwrap();
        assert_eq!(app_only.len(), 1);
        assert_eq!(app_only[0].value, 2.0);
    }

    #[tokio::test]
    async fn test_connections_are_released_on_drop() {
        let backend = MemoryBackend::new();
        {
            let _a = backend.connect().await.unwrap();
            let _b = backend.connect().await.unwrap();
            assert_eq!(backend.open_connections(), 2);
        }
        assert_eq!(backend.open_connections(), 0);
        assert_eq!(backend.connections_opened(), 2);
    }

    #[tokio::test]
    async fn test_fail_points() {
        let backend = MemoryBackend::new();
        backend.fail(FailPoint::Connect);
        assert!(matches!(
            backend.connect().await,
            Err(BackendError::Connect(_))
        ));

        backend.heal(FailPoint::Connect);
        assert!(backend.connect().await.is_ok());
    }
}
