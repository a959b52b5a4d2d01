use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Errors raised by a cache store.
///
/// A missing key is never an error. Callers treat every variant as a
/// non-fatal warning and carry on without caching.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache storage error: {0}")]
    Storage(String),

    #[cfg(feature = "database")]
    #[error("cache database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Namespaced, TTL-aware key/value persistence.
///
/// Expiration is enforced lazily: `get` evicts an expired entry it observes,
/// `has` reports it as absent without touching it, and `list_keys` keeps
/// reporting it until something evicts it.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Live value under `key`, evicting it first if it has expired.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError>;

    /// Store `value` under `key`, replacing any existing entry.
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Idempotent delete.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Drop every entry in the namespace regardless of expiration.
    async fn clear(&self) -> Result<(), CacheError>;

    async fn has(&self, key: &str) -> Result<bool, CacheError>;

    /// Keys of all stored entries, including expired ones not yet evicted.
    async fn list_keys(&self) -> Result<Vec<String>, CacheError>;

    /// Evict every expired entry and return how many were removed.
    async fn clear_expired(&self) -> Result<usize, CacheError>;
}

impl dyn CacheStore {
    /// Typed read. A stored value that does not decode as `T` is reported
    /// as a serialization error for this key only.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_value(value)?;
        self.set(key, value, ttl).await
    }
}
