use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

use super::errors::MigrationError;
use super::events::{MigrationEvent, MigrationOutcome, MigrationRequest};
use super::run_token::{RunGuard, RunRegistry, RunToken};
use crate::executor::PhaseExecutor;
use crate::project::ProjectRef;
use crate::telemetry::{create_migration_span, generate_correlation_id};
use crate::workflow::{PhasePlan, PhaseResult, PlanError, WorkflowCache, WorkflowProgress};

/// A run executing on a background task
#[derive(Debug)]
pub struct MigrationRun {
    pub token: RunToken,
    pub events: mpsc::UnboundedReceiver<MigrationEvent>,
    pub handle: JoinHandle<Result<MigrationOutcome, MigrationError>>,
}

impl MigrationRun {
    /// Wait for the run to end, discarding any events not yet consumed.
    pub async fn finish(self) -> Result<MigrationOutcome, MigrationError> {
        self.handle
            .await
            .map_err(|e| MigrationError::Aborted(e.to_string()))?
    }
}

/// Drives the phases of a project's plan strictly in order, resuming from
/// cached progress and checkpointing after every phase.
#[derive(Debug, Clone)]
pub struct MigrationOrchestrator {
    executor: PhaseExecutor,
    cache: WorkflowCache,
    runs: RunRegistry,
}

impl MigrationOrchestrator {
    pub fn new(executor: PhaseExecutor, cache: WorkflowCache) -> Self {
        Self {
            executor,
            cache,
            runs: RunRegistry::new(),
        }
    }

    pub fn cache(&self) -> &WorkflowCache {
        &self.cache
    }

    pub fn executor(&self) -> &PhaseExecutor {
        &self.executor
    }

    pub fn runs(&self) -> &RunRegistry {
        &self.runs
    }

    /// Load the cached plan and check it can be executed.
    pub async fn load_plan(&self, project: &ProjectRef) -> Result<PhasePlan, MigrationError> {
        let plan = self
            .cache
            .get_plan(project)
            .await
            .map_err(|source| MigrationError::PlanUnavailable {
                project: project.clone(),
                source,
            })?
            .ok_or_else(|| MigrationError::NoPlanFound {
                project: project.clone(),
            })?;

        match plan.validate() {
            Ok(()) => Ok(plan),
            Err(PlanError::Empty) => Err(MigrationError::NoPlanFound {
                project: project.clone(),
            }),
            Err(source) => Err(MigrationError::InvalidPlan {
                project: project.clone(),
                source,
            }),
        }
    }

    /// Start a run on a background task. Plan and token problems are
    /// reported before anything is spawned.
    pub async fn start(&self, request: MigrationRequest) -> Result<MigrationRun, MigrationError> {
        let guard = self.acquire(&request.project)?;
        let plan = self.load_plan(&request.project).await?;
        let token = guard.token().clone();
        let (events_tx, events) = mpsc::unbounded_channel();

        let orchestrator = self.clone();
        let handle =
            tokio::spawn(async move { orchestrator.execute(request, plan, guard, events_tx).await });

        Ok(MigrationRun { token, events, handle })
    }

    /// Run to completion on the current task, streaming events to `events`.
    pub async fn run(
        &self,
        request: MigrationRequest,
        events: mpsc::UnboundedSender<MigrationEvent>,
    ) -> Result<MigrationOutcome, MigrationError> {
        let guard = self.acquire(&request.project)?;
        let plan = self.load_plan(&request.project).await?;
        self.execute(request, plan, guard, events).await
    }

    /// Ask the active run of `project` to stop. No checkpoint of that run
    /// reaches the cache once this returns.
    pub async fn cancel(&self, project: &ProjectRef) -> bool {
        let cancelled = self.runs.cancel(project).await;
        if cancelled {
            info!(project = %project, "Cancellation requested");
        }
        cancelled
    }

    fn acquire(&self, project: &ProjectRef) -> Result<RunGuard, MigrationError> {
        self.runs.acquire(project).map_err(|existing| {
            warn!(project = %project, run_token = %existing.id, "Migration already running");
            MigrationError::AlreadyRunning {
                project: project.clone(),
                run_id: existing.id,
            }
        })
    }

    async fn execute(
        &self,
        request: MigrationRequest,
        plan: PhasePlan,
        guard: RunGuard,
        events: mpsc::UnboundedSender<MigrationEvent>,
    ) -> Result<MigrationOutcome, MigrationError> {
        let correlation_id = generate_correlation_id();
        let span = create_migration_span("run", &request.project, &correlation_id);
        self.execute_phases(&request, &plan, &guard, &events)
            .instrument(span)
            .await
    }

    async fn execute_phases(
        &self,
        request: &MigrationRequest,
        plan: &PhasePlan,
        guard: &RunGuard,
        events: &mpsc::UnboundedSender<MigrationEvent>,
    ) -> Result<MigrationOutcome, MigrationError> {
        let project = &request.project;
        let cancel = guard.cancel_flag();
        let total_phases = plan.total_phases();

        let mut progress = self.resume_point(project, plan).await;
        let mut cache_degraded = false;
        info!(
            run_token = %guard.token().id,
            total_phases,
            resumed_phases = progress.completed_phases(),
            "Starting migration run"
        );
        emit(
            events,
            MigrationEvent::RunStarted {
                run_id: guard.token().id,
                total_phases,
                resumed_phases: progress.completed_phases(),
            },
        );

        for phase in plan.phases.iter().skip(progress.phase_results.len()) {
            if cancel.is_cancelled() {
                return Ok(cancelled(progress, events));
            }

            emit(
                events,
                MigrationEvent::PhaseStarted {
                    phase_number: phase.number,
                    phase_name: phase.name.clone(),
                    total_phases,
                },
            );

            let is_last_phase = phase.number == total_phases;
            let (result, error) = match self
                .executor
                .run(project, &request.user, phase, is_last_phase)
                .await
            {
                Ok(result) => (result, None),
                Err(failure) => {
                    let message = failure.to_string();
                    (PhaseResult::failed(phase, message.clone()), Some(message))
                }
            };

            {
                let _checkpoint = cancel.checkpoint().await;
                if cancel.is_cancelled() {
                    return Ok(cancelled(progress, events));
                }

                progress.record(result)?;

                if !cache_degraded {
                    if let Err(e) = self.cache.save_progress(project, &progress).await {
                        error!(
                            phase = phase.number,
                            error = %e,
                            "Failed to checkpoint progress, continuing without cache"
                        );
                        cache_degraded = true;
                        emit(
                            events,
                            MigrationEvent::CacheDegraded {
                                message: e.to_string(),
                            },
                        );
                    }
                }
            }

            emit(
                events,
                MigrationEvent::PhaseFinished {
                    phase_number: phase.number,
                    error,
                    snapshot: progress.clone(),
                },
            );
        }

        let summary = progress.summary(total_phases);
        info!(
            completed_phases = summary.completed_phases,
            failed_phases = ?summary.failed_phases,
            success_rate = summary.success_rate,
            "Migration run completed"
        );
        emit(
            events,
            MigrationEvent::Completed {
                snapshot: progress.clone(),
                summary: summary.clone(),
            },
        );

        Ok(MigrationOutcome::Completed {
            progress,
            summary,
            cache_degraded,
        })
    }

    /// Cached progress to continue from. Progress that no longer lines up
    /// with the plan, or cannot be read, is replaced by a fresh run whose
    /// first checkpoint overwrites it.
    async fn resume_point(&self, project: &ProjectRef, plan: &PhasePlan) -> WorkflowProgress {
        match self.cache.get_progress(project).await {
            Ok(Some(progress)) if progress.fits_plan(plan) => progress,
            Ok(Some(progress)) => {
                warn!(
                    recorded_phases = progress.phase_results.len(),
                    total_phases = plan.total_phases(),
                    "Cached progress does not match the plan, starting over"
                );
                WorkflowProgress::new()
            }
            Ok(None) => WorkflowProgress::new(),
            Err(e) => {
                warn!(error = %e, "Could not read cached progress, starting over");
                WorkflowProgress::new()
            }
        }
    }
}

fn cancelled(
    progress: WorkflowProgress,
    events: &mpsc::UnboundedSender<MigrationEvent>,
) -> MigrationOutcome {
    info!(completed_phases = progress.completed_phases(), "Migration run cancelled");
    emit(
        events,
        MigrationEvent::Cancelled {
            completed_phases: progress.completed_phases(),
        },
    );
    MigrationOutcome::Cancelled { progress }
}

fn emit(events: &mpsc::UnboundedSender<MigrationEvent>, event: MigrationEvent) {
    // Nobody listening is fine; the run carries on
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryCacheStore, MockCacheStore};
    use crate::executor::ScriptedPhaseService;
    use crate::project::UserIdentity;
    use crate::workflow::{CacheKeys, Phase};
    use std::sync::Arc;
    use std::time::Duration;

    fn project() -> ProjectRef {
        ProjectRef::new("acme", "storefront").unwrap()
    }

    fn plan(phases: u32) -> PhasePlan {
        PhasePlan::new(
            (1..=phases)
                .map(|n| Phase {
                    number: n,
                    name: format!("phase {n}"),
                    file_list: vec![format!("src/p{n}.js")],
                })
                .collect(),
        )
    }

    fn orchestrator(service: ScriptedPhaseService, cache: WorkflowCache) -> MigrationOrchestrator {
        let executor = PhaseExecutor::new(Arc::new(service), Duration::from_secs(30));
        MigrationOrchestrator::new(executor, cache)
    }

    fn request() -> MigrationRequest {
        MigrationRequest::new(project(), UserIdentity::new("user-1"))
    }

    #[tokio::test]
    async fn test_run_without_plan_attempts_nothing() {
        let service = ScriptedPhaseService::new();
        let cache = WorkflowCache::new(Arc::new(MemoryCacheStore::new()));
        let orchestrator = orchestrator(service.clone(), cache);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = orchestrator.run(request(), tx).await.unwrap_err();

        assert!(matches!(err, MigrationError::NoPlanFound { .. }));
        assert!(service.executed_phases().is_empty());
        assert!(!orchestrator.runs().is_active(&project()));
    }

    #[tokio::test]
    async fn test_empty_plan_is_reported_as_missing() {
        let cache = WorkflowCache::new(Arc::new(MemoryCacheStore::new()));
        cache.save_plan(&project(), &PhasePlan::default()).await.unwrap();
        let orchestrator = orchestrator(ScriptedPhaseService::new(), cache);

        let err = orchestrator.load_plan(&project()).await.unwrap_err();
        assert_eq!(err.code(), "NO_PLAN_FOUND");
    }

    #[tokio::test]
    async fn test_non_contiguous_plan_is_rejected() {
        let cache = WorkflowCache::new(Arc::new(MemoryCacheStore::new()));
        let mut broken = plan(3);
        broken.phases[1].number = 5;
        cache.save_plan(&project(), &broken).await.unwrap();
        let orchestrator = orchestrator(ScriptedPhaseService::new(), cache);

        let err = orchestrator.load_plan(&project()).await.unwrap_err();
        assert!(matches!(err, MigrationError::InvalidPlan { .. }));
    }

    #[tokio::test]
    async fn test_run_emits_snapshot_per_phase() {
        let cache = WorkflowCache::new(Arc::new(MemoryCacheStore::new()));
        cache.save_plan(&project(), &plan(3)).await.unwrap();
        let orchestrator = orchestrator(ScriptedPhaseService::new(), cache.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = orchestrator.run(request(), tx).await.unwrap();

        let mut snapshots = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let MigrationEvent::PhaseFinished { snapshot, .. } = event {
                snapshots.push(snapshot.completed_phases());
            }
        }
        assert_eq!(snapshots, vec![1, 2, 3]);
        assert_eq!(outcome.progress().completed_phases(), 3);
        let saved = cache.get_progress(&project()).await.unwrap().unwrap();
        assert_eq!(&saved, outcome.progress());
    }

    #[tokio::test]
    async fn test_mismatched_cached_progress_is_discarded() {
        let cache = WorkflowCache::new(Arc::new(MemoryCacheStore::new()));
        cache.save_plan(&project(), &plan(2)).await.unwrap();
        let mut stale = WorkflowProgress::new();
        for n in 1..=3 {
            stale
                .record(ScriptedPhaseService::converted(n, "old", &["a.js"], &[]))
                .unwrap();
        }
        cache.save_progress(&project(), &stale).await.unwrap();

        let service = ScriptedPhaseService::new();
        let orchestrator = orchestrator(service.clone(), cache);
        let (tx, _rx) = mpsc::unbounded_channel();
        orchestrator.run(request(), tx).await.unwrap();

        assert_eq!(service.executed_phases(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_checkpoint_failure_degrades_to_memory() {
        let stored_plan = serde_json::to_value(plan(3)).unwrap();
        let plan_key = CacheKeys::phase_plan(&project());
        let progress_key = CacheKeys::progress(&project());

        let mut store = MockCacheStore::new();
        store.expect_get().returning(move |key| {
            if key == plan_key {
                Ok(Some(stored_plan.clone()))
            } else {
                Ok(None)
            }
        });
        store
            .expect_set()
            .withf(move |key, _, _| key == progress_key)
            .times(1)
            .returning(|_, _, _| Err(CacheError::Storage("disk full".to_string())));

        let service = ScriptedPhaseService::new();
        let orchestrator = orchestrator(service.clone(), WorkflowCache::new(Arc::new(store)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = orchestrator.run(request(), tx).await.unwrap();

        assert_eq!(service.executed_phases(), vec![1, 2, 3]);
        match outcome {
            MigrationOutcome::Completed {
                progress,
                cache_degraded,
                ..
            } => {
                assert!(cache_degraded);
                assert_eq!(progress.completed_phases(), 3);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let mut degraded_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, MigrationEvent::CacheDegraded { .. }) {
                degraded_events += 1;
            }
        }
        assert_eq!(degraded_events, 1);
    }

    #[tokio::test]
    async fn test_unreadable_progress_restarts_and_keeps_checkpointing() {
        let stored_plan = serde_json::to_value(plan(2)).unwrap();
        let plan_key = CacheKeys::phase_plan(&project());
        let progress_key = CacheKeys::progress(&project());
        let read_key = progress_key.clone();

        let mut store = MockCacheStore::new();
        store.expect_get().returning(move |key| {
            if key == plan_key {
                Ok(Some(stored_plan.clone()))
            } else if key == read_key {
                Err(CacheError::Storage("unreadable entry".to_string()))
            } else {
                Ok(None)
            }
        });
        store
            .expect_set()
            .withf(move |key, _, _| key == progress_key)
            .times(2)
            .returning(|_, _, _| Ok(()));

        let service = ScriptedPhaseService::new();
        let orchestrator = orchestrator(service.clone(), WorkflowCache::new(Arc::new(store)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = orchestrator.run(request(), tx).await.unwrap();

        assert_eq!(service.executed_phases(), vec![1, 2]);
        assert!(matches!(
            outcome,
            MigrationOutcome::Completed {
                cache_degraded: false,
                ..
            }
        ));
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, MigrationEvent::CacheDegraded { .. }));
        }
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_stop_run() {
        let cache = WorkflowCache::new(Arc::new(MemoryCacheStore::new()));
        cache.save_plan(&project(), &plan(2)).await.unwrap();
        let orchestrator = orchestrator(ScriptedPhaseService::new(), cache);

        let run = orchestrator.start(request()).await.unwrap();
        let MigrationRun { events, handle, .. } = run;
        drop(events);

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.progress().completed_phases(), 2);
    }
}
