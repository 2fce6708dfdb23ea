use dashmap::DashMap;

use super::error::StoreError;
use crate::data::{CounterId, ID_SPACE};
use crate::storage::{BackendError, CounterConnection};

/// Names already confirmed in the mapping table, with their stored ids.
///
/// Entries are only added after the row is known to exist, so the cache
/// never claims a name the table does not have.
#[derive(Debug, Default)]
pub struct NameCache {
    ids: DashMap<String, CounterId>,
}

impl NameCache {
    pub fn get(&self, name: &str) -> Option<CounterId> {
        self.ids.get(name).map(|entry| *entry)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn confirm(&self, name: &str, id: CounterId) {
        self.ids.entry(name.to_string()).or_insert(id);
    }
}

/// Maps counter names to their compact ids, creating mapping rows on first
/// sight. Both the write and read paths go through here.
#[derive(Debug, Default)]
pub struct IdResolver {
    cache: NameCache,
}

impl IdResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &NameCache {
        &self.cache
    }

    /// Ids for every name from the cache alone, or `None` if any misses.
    pub fn cached_ids<'a, I>(&self, names: I) -> Option<Vec<CounterId>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names.into_iter().map(|name| self.cache.get(name)).collect()
    }

    /// Record a row read back from the mapping table.
    pub fn remember(&self, name: &str, id: CounterId) {
        self.cache.confirm(name, id);
    }

    /// Id of `name`, inserting a mapping row if none exists.
    ///
    /// Starts at the hash slot and probes forward when the slot belongs to
    /// another name. A rejected insert may also mean a concurrent writer
    /// created the same name, so every attempt re-reads by name first.
    pub async fn resolve(
        &self,
        conn: &mut dyn CounterConnection,
        name: &str,
    ) -> Result<CounterId, StoreError> {
        if let Some(id) = self.cache.get(name) {
            return Ok(id);
        }

        let fail = |source: BackendError| StoreError::Resolution {
            name: name.to_string(),
            source,
        };

        for attempt in 0..ID_SPACE {
            if let Some(id) = conn.find_counter_id(name).await.map_err(fail)? {
                self.cache.confirm(name, id);
                return Ok(id);
            }

            let candidate = CounterId::probe(name, attempt);
            if conn.insert_counter_name(candidate, name).await.map_err(fail)? {
                if attempt > 0 {
                    tracing::info!(
                        counter = name,
                        id = %candidate,
                        probes = attempt,
                        "Counter id collision resolved"
                    );
                } else {
                    tracing::debug!(counter = name, id = %candidate, "Counter name registered");
                }
                self.cache.confirm(name, candidate);
                return Ok(candidate);
            }
        }

        Err(StoreError::IdSpaceExhausted(name.to_string()))
    }

    /// Resolve a batch, keeping positional correspondence with `names`.
    pub async fn resolve_all(
        &self,
        conn: &mut dyn CounterConnection,
        names: &[&str],
    ) -> Result<Vec<CounterId>, StoreError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            ids.push(self.resolve(conn, name).await?);
        }
        Ok(ids)
    }

    /// Id of `name` if it has a mapping row. Never inserts.
    pub async fn lookup(
        &self,
        conn: &mut dyn CounterConnection,
        name: &str,
    ) -> Result<Option<CounterId>, BackendError> {
        if let Some(id) = self.cache.get(name) {
            return Ok(Some(id));
        }
        let found = conn.find_counter_id(name).await?;
        if let Some(id) = found {
            self.cache.confirm(name, id);
        }
        Ok(found)
    }
}
