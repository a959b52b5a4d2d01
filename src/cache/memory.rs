use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::entry::CacheEntry;
use super::store::{CacheError, CacheStore};
use crate::observability::cache_metrics;

/// In-process store backed by a moka concurrent map.
///
/// moka's own time-based eviction is left off: entries must stay listable
/// after they expire until a read or a sweep evicts them.
#[derive(Clone)]
pub struct MemoryCacheStore {
    entries: Cache<String, CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Cache::builder().build(),
            clock,
        }
    }

    fn snapshot_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(key, _)| key.as_ref().clone())
            .collect()
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheStore")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let Some(entry) = self.entries.get(key).await else {
            cache_metrics().record_miss();
            return Ok(None);
        };

        if entry.is_live(self.clock.now()) {
            cache_metrics().record_hit();
            return Ok(Some(entry.value));
        }

        self.entries.invalidate(key).await;
        cache_metrics().record_eviction();
        debug!(key = %key, "Evicted expired cache entry on read");
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::new(value, self.clock.now(), ttl);
        self.entries.insert(key.to_string(), entry).await;
        cache_metrics().record_write();
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(key).await;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        for key in self.snapshot_keys() {
            self.entries.invalidate(&key).await;
        }
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self
            .entries
            .get(key)
            .await
            .is_some_and(|entry| entry.is_live(self.clock.now())))
    }

    async fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys = self.snapshot_keys();
        keys.sort();
        Ok(keys)
    }

    async fn clear_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for key in &expired {
            self.entries.invalidate(key).await;
            cache_metrics().record_eviction();
        }
        Ok(expired.len())
    }
}
