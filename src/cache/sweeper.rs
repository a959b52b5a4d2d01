use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::CacheStore;

/// Periodically evict expired entries. Correctness never depends on this
/// running; it only keeps the medium from accumulating dead entries.
pub fn spawn_expiry_sweeper(store: Arc<dyn CacheStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.clear_expired().await {
                Ok(0) => debug!("Expiry sweep found nothing to evict"),
                Ok(evicted) => info!(evicted = evicted, "Expiry sweep evicted cache entries"),
                Err(e) => warn!(error = %e, "Expiry sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, MemoryCacheStore};
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_after_interval() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryCacheStore::with_clock(clock.clone()));
        store.set("k", json!(1), Some(Duration::from_secs(1))).await.unwrap();
        clock.advance(Duration::from_secs(2));

        let handle = spawn_expiry_sweeper(store.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(store.list_keys().await.unwrap().is_empty());
        handle.abort();
    }
}
