use std::sync::atomic::{AtomicBool, Ordering};

use crate::storage::{CounterConnection, SchemaError, SchemaSource};

/// Runs the schema script once per store, on first use.
///
/// The flag only flips after a successful run, so a failed bootstrap is
/// retried by the next operation. Concurrent first calls may both run the
/// script. On PostgreSQL two racing `CREATE TABLE IF NOT EXISTS` can still
/// collide, in which case the loser reports one schema error and the next
/// operation retries the bootstrap.
#[derive(Debug)]
pub struct SchemaBootstrap {
    source: SchemaSource,
    done: AtomicBool,
}

impl SchemaBootstrap {
    pub fn new(source: SchemaSource) -> Self {
        Self {
            source,
            done: AtomicBool::new(false),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Returns `true` if this call ran the script.
    pub async fn ensure(&self, conn: &mut dyn CounterConnection) -> Result<bool, SchemaError> {
        if self.is_done() {
            return Ok(false);
        }

        let script = self.source.load().await?;
        conn.execute_script(&script).await?;

        self.done.store(true, Ordering::Release);
        tracing::info!("Counter schema bootstrap complete");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CounterBackend, FailPoint, MemoryBackend, NAMES_TABLE};

    #[tokio::test]
    async fn test_runs_once() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();
        let bootstrap = SchemaBootstrap::new(SchemaSource::Embedded);

        assert!(bootstrap.ensure(conn.as_mut()).await.unwrap());
        assert!(bootstrap.is_done());
        assert!(!bootstrap.ensure(conn.as_mut()).await.unwrap());
        assert!(backend.has_table(NAMES_TABLE));
    }

    #[tokio::test]
    async fn test_two_instances_rerun_safely() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();

        let first = SchemaBootstrap::new(SchemaSource::Embedded);
        let second = SchemaBootstrap::new(SchemaSource::Embedded);
        assert!(first.ensure(conn.as_mut()).await.unwrap());
        assert!(second.ensure(conn.as_mut()).await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_leaves_flag_unset() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();
        let bootstrap = SchemaBootstrap::new(SchemaSource::Embedded);

        backend.fail(FailPoint::Script);
        assert!(matches!(
            bootstrap.ensure(conn.as_mut()).await,
            Err(SchemaError::Execution(_))
        ));
        assert!(!bootstrap.is_done());

        backend.heal(FailPoint::Script);
        assert!(bootstrap.ensure(conn.as_mut()).await.unwrap());
    }
}
