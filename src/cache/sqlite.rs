use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::entry::CacheEntry;
use super::store::{CacheError, CacheStore};
use crate::observability::cache_metrics;

/// Embedded-database store. Several namespaces may share one database file.
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl SqliteCacheStore {
    /// Open (creating if missing) the database at `url` and ensure the
    /// schema exists.
    pub async fn open(url: &str, namespace: &str, max_connections: u32) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        info!(url = %url, namespace = %namespace, "Opened sqlite cache store");
        Self::with_pool(pool, namespace, Arc::new(SystemClock)).await
    }

    pub async fn with_pool(
        pool: SqlitePool,
        namespace: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace    TEXT    NOT NULL,
                key          TEXT    NOT NULL,
                value        TEXT    NOT NULL,
                stored_at_ms INTEGER NOT NULL,
                ttl_ms       INTEGER,
                PRIMARY KEY (namespace, key)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            namespace: namespace.to_string(),
            clock,
        })
    }

    async fn fetch_entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row = sqlx::query(
            r#"
            SELECT value, stored_at_ms, ttl_ms
            FROM cache_entries
            WHERE namespace = ?1 AND key = ?2
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let value: String = row.get("value");
        let stored_at_ms: i64 = row.get("stored_at_ms");
        let ttl_ms: Option<i64> = row.get("ttl_ms");

        let stored_at = DateTime::<Utc>::from_timestamp_millis(stored_at_ms)
            .ok_or_else(|| CacheError::Storage(format!("invalid timestamp for key {key}")))?;
        Ok(Some(CacheEntry::new(
            serde_json::from_str(&value)?,
            stored_at,
            ttl_ms.map(|ms| Duration::from_millis(ms.max(0) as u64)),
        )))
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let Some(entry) = self.fetch_entry(key).await? else {
            cache_metrics().record_miss();
            return Ok(None);
        };

        if entry.is_live(self.clock.now()) {
            cache_metrics().record_hit();
            return Ok(Some(entry.value));
        }

        self.remove(key).await?;
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
        let value = serde_json::to_string(&value)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO cache_entries (namespace, key, value, stored_at_ms, ttl_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(value)
        .bind(self.clock.now().timestamp_millis())
        .bind(ttl.map(|ttl| ttl.as_millis().min(i64::MAX as u128) as i64))
        .execute(&self.pool)
        .await?;
        cache_metrics().record_write();
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2")
            .bind(&self.namespace)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries WHERE namespace = ?1")
            .bind(&self.namespace)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        let entry = self.fetch_entry(key).await?;
        Ok(entry.is_some_and(|entry| entry.is_live(self.clock.now())))
    }

    async fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        let rows = sqlx::query("SELECT key FROM cache_entries WHERE namespace = ?1 ORDER BY key")
            .bind(&self.namespace)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("key")).collect())
    }

    async fn clear_expired(&self) -> Result<usize, CacheError> {
        let result = sqlx::query(
            r#"
            DELETE FROM cache_entries
            WHERE namespace = ?1 AND ttl_ms IS NOT NULL AND stored_at_ms + ttl_ms <= ?2
            "#,
        )
        .bind(&self.namespace)
        .bind(self.clock.now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        let evicted = result.rows_affected() as usize;
        for _ in 0..evicted {
            cache_metrics().record_eviction();
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use serde_json::json;

    async fn memory_store(namespace: &str, clock: Arc<ManualClock>) -> SqliteCacheStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteCacheStore::with_pool(pool, namespace, clock).await.unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_store_expires_lazily() {
        let clock = Arc::new(ManualClock::default());
        let store = memory_store("workflow", clock.clone()).await;

        store.set("k", json!({"v": 1}), Some(Duration::from_secs(5))).await.unwrap();
        store.set("k", json!({"v": 2}), Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"v": 2})));

        clock.advance(Duration::from_secs(6));
        assert_eq!(store.list_keys().await.unwrap(), vec!["k".to_string()]);
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_clear_expired_and_clear() {
        let clock = Arc::new(ManualClock::default());
        let store = memory_store("workflow", clock.clone()).await;
        store.set("short", json!(1), Some(Duration::from_secs(1))).await.unwrap();
        store.set("forever", json!(2), None).await.unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.clear_expired().await.unwrap(), 1);
        assert!(store.has("forever").await.unwrap());

        store.clear().await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
    }
}
