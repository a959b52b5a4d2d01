use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::entry::CacheEntry;
use super::store::{CacheError, CacheStore};
use crate::observability::cache_metrics;

const ENTRY_SUFFIX: &str = ".json";

/// Durable store keeping one JSON document per key under
/// `<root>/<namespace>/`.
///
/// Writes land in a uniquely named temp file that is renamed into place, so
/// a crash mid-write leaves the previous entry intact.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileCacheStore {
    /// Open (creating if needed) the namespace directory.
    pub async fn open(root: impl AsRef<Path>, namespace: &str) -> Result<Self, CacheError> {
        Self::open_with_clock(root, namespace, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        root: impl AsRef<Path>,
        namespace: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        if namespace.is_empty() {
            return Err(CacheError::Storage("cache namespace must not be empty".to_string()));
        }
        let dir = root.as_ref().join(escape_key(namespace));
        fs::create_dir_all(&dir).await?;
        debug!(dir = ?dir, "Opened file cache namespace");
        Ok(Self { dir, clock })
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", escape_key(key), ENTRY_SUFFIX))
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<CacheEntry>, CacheError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_file(path: &Path) -> Result<(), CacheError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn entry_files(&self) -> Result<Vec<(String, PathBuf)>, CacheError> {
        let mut files = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };

        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(ENTRY_SUFFIX) else { continue };
            match unescape_key(stem) {
                Some(key) => files.push((key, item.path())),
                None => warn!(file = %name, "Skipping cache file with undecodable name"),
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let path = self.entry_path(key);
        let Some(entry) = self.read_entry(&path).await? else {
            cache_metrics().record_miss();
            return Ok(None);
        };

        if entry.is_live(self.clock.now()) {
            cache_metrics().record_hit();
            return Ok(Some(entry.value));
        }

        Self::delete_file(&path).await?;
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
        let serialized = serde_json::to_vec(&entry)?;

        let path = self.entry_path(key);
        let temp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&temp, serialized).await?;
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        cache_metrics().record_write();
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        Self::delete_file(&self.entry_path(key)).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            if item.file_type().await?.is_file() {
                Self::delete_file(&item.path()).await?;
            }
        }
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        let entry = self.read_entry(&self.entry_path(key)).await?;
        Ok(entry.is_some_and(|entry| entry.is_live(self.clock.now())))
    }

    async fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        let mut keys: Vec<String> = self.entry_files().await?.into_iter().map(|(key, _)| key).collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let mut evicted = 0;
        for (key, path) in self.entry_files().await? {
            match self.read_entry(&path).await {
                Ok(Some(entry)) if !entry.is_live(now) => {
                    Self::delete_file(&path).await?;
                    cache_metrics().record_eviction();
                    evicted += 1;
                }
                Ok(_) => {}
                Err(CacheError::Serialization(e)) => {
                    warn!(key = %key, error = %e, "Leaving unreadable cache entry in place");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(evicted)
    }
}

/// Map an arbitrary key onto a portable file name. Alphanumerics, `-` and
/// `_` pass through; every other byte becomes `%XX`.
fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("%{byte:02X}"));
        }
    }
    escaped
}

fn unescape_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> (FileCacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let store = FileCacheStore::open_with_clock(dir.path(), "workflow", clock.clone())
            .await
            .unwrap();
        (store, clock)
    }

    #[test]
    fn test_key_escaping_is_reversible() {
        for key in ["migration:acme/app:progress", "plain", "spaces and %", "ünïcode.key"] {
            let escaped = escape_key(key);
            assert!(!escaped.contains('/'));
            assert!(!escaped.contains(':'));
            assert_eq!(unescape_key(&escaped).as_deref(), Some(key));
        }
        assert_eq!(unescape_key("bad%Z1"), None);
        assert_eq!(unescape_key("truncated%4"), None);
    }

    #[tokio::test]
    async fn test_values_survive_reopening_the_store() {
        let dir = TempDir::new().unwrap();
        {
            let (store, _) = open_store(&dir).await;
            store.set("migration:a/b:progress", json!({"phaseResults": []}), None).await.unwrap();
        }

        let (reopened, _) = open_store(&dir).await;
        assert_eq!(
            reopened.get("migration:a/b:progress").await.unwrap(),
            Some(json!({"phaseResults": []}))
        );
        assert_eq!(
            reopened.list_keys().await.unwrap(),
            vec!["migration:a/b:progress".to_string()]
        );
    }

    #[tokio::test]
    async fn test_expired_entry_is_listed_until_read() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = open_store(&dir).await;
        store.set("k", json!("v"), Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!("v")));

        clock.advance(Duration::from_secs(11));
        assert!(!store.has("k").await.unwrap());
        assert_eq!(store.list_keys().await.unwrap(), vec!["k".to_string()]);

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_entry_only_affects_its_own_key() {
        let dir = TempDir::new().unwrap();
        let (store, _) = open_store(&dir).await;
        store.set("good", json!(1), None).await.unwrap();
        fs::write(store.directory().join("bad.json"), b"{not json").await.unwrap();

        assert!(matches!(store.get("bad").await, Err(CacheError::Serialization(_))));
        assert_eq!(store.get("good").await.unwrap(), Some(json!(1)));
        assert_eq!(store.clear_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_and_remove() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = open_store(&dir).await;
        store.set("a", json!(1), None).await.unwrap();
        store.set("b", json!(2), Some(Duration::from_secs(1))).await.unwrap();
        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.clear_expired().await.unwrap(), 1);

        store.set("c", json!(3), None).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let dir = TempDir::new().unwrap();
        let first = FileCacheStore::open(dir.path(), "one").await.unwrap();
        let second = FileCacheStore::open(dir.path(), "two").await.unwrap();

        first.set("shared", json!("first"), None).await.unwrap();
        assert_eq!(second.get("shared").await.unwrap(), None);

        second.clear().await.unwrap();
        assert_eq!(first.get("shared").await.unwrap(), Some(json!("first")));
    }
}
