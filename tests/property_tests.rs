//! Property-based checks for phase ordering, dependency merging and cache
//! expiration.

use chrono::Utc;
use phase_migrate::cache::{CacheStore, ManualClock, MemoryCacheStore};
use phase_migrate::executor::{ScriptedPhaseService, ServiceError};
use phase_migrate::orchestrator::MigrationRequest;
use phase_migrate::project::UserIdentity;
use phase_migrate::workflow::{WorkflowCache, WorkflowProgress};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

mod common;
use common::{orchestrator, plan, project};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_results_stay_contiguous_whatever_fails(
        phases in 1u32..10,
        failing in proptest::collection::btree_set(1u32..10, 0..5),
    ) {
        let progress = tokio_test::block_on(async {
            let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
            WorkflowCache::new(store.clone()).save_plan(&project(), &plan(phases)).await.unwrap();
            let service = failing.iter().fold(ScriptedPhaseService::new(), |service, n| {
                service.fail_phase(*n, ServiceError::Network("unreachable".to_string()))
            });
            let (tx, _rx) = mpsc::unbounded_channel();
            orchestrator(&service, store, Duration::from_secs(30))
                .run(MigrationRequest::new(project(), UserIdentity::new("prop")), tx)
                .await
                .unwrap()
                .progress()
                .clone()
        });

        prop_assert_eq!(progress.completed_phases(), phases);
        prop_assert!(progress.is_contiguous());
        let expected_failures: Vec<u32> = failing.into_iter().filter(|n| *n <= phases).collect();
        prop_assert_eq!(progress.failed_phase_numbers(), expected_failures);
        prop_assert!(progress.success_rate() <= 100);
    }

    #[test]
    fn prop_merging_dependencies_twice_changes_nothing(
        deps in proptest::collection::vec("[a-z@/-]{0,12}", 0..8),
    ) {
        let mut progress = WorkflowProgress::new();
        progress.merge_dependencies(&deps);
        let once = progress.dependencies.clone();
        progress.merge_dependencies(&deps);

        prop_assert_eq!(&progress.dependencies, &once);
        let expected: BTreeSet<String> = deps
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        prop_assert_eq!(progress.dependencies, expected);
    }

    #[test]
    fn prop_entries_vanish_after_ttl(
        ttl_secs in 1u64..3600,
        value in any::<u32>(),
    ) {
        tokio_test::block_on(async {
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let store = MemoryCacheStore::with_clock(clock.clone());
            let ttl = Duration::from_secs(ttl_secs);

            store.set("k", serde_json::json!(value), Some(ttl)).await.unwrap();
            assert_eq!(store.get("k").await.unwrap(), Some(serde_json::json!(value)));

            clock.advance(ttl - Duration::from_millis(1));
            assert!(store.has("k").await.unwrap());

            clock.advance(Duration::from_millis(1));
            assert_eq!(store.get("k").await.unwrap(), None);
            assert!(store.list_keys().await.unwrap().is_empty());
        });
    }
}

#[tokio::test]
async fn test_overwrite_replaces_value_and_ttl() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = MemoryCacheStore::with_clock(clock.clone());

    store.set("k", serde_json::json!(1), Some(Duration::from_secs(1))).await.unwrap();
    store.set("k", serde_json::json!(2), None).await.unwrap();
    clock.advance(Duration::from_secs(10));

    assert_eq!(store.get("k").await.unwrap(), Some(serde_json::json!(2)));
}

#[test]
fn test_success_rate_is_zero_without_files() {
    assert_eq!(WorkflowProgress::new().success_rate(), 0);
}
