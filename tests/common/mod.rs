#![allow(dead_code)]

use phase_migrate::cache::CacheStore;
use phase_migrate::executor::{PhaseExecutor, ScriptedPhaseService};
use phase_migrate::orchestrator::{MigrationEvent, MigrationOrchestrator};
use phase_migrate::project::ProjectRef;
use phase_migrate::workflow::{Phase, PhasePlan, WorkflowCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub fn project() -> ProjectRef {
    ProjectRef::new("acme", "legacy-shop").unwrap()
}

pub fn plan(phases: u32) -> PhasePlan {
    PhasePlan::new(
        (1..=phases)
            .map(|n| Phase {
                number: n,
                name: format!("phase {n}"),
                file_list: vec![format!("src/module{n}.js")],
            })
            .collect(),
    )
}

pub fn orchestrator(
    service: &ScriptedPhaseService,
    store: Arc<dyn CacheStore>,
    timeout: Duration,
) -> MigrationOrchestrator {
    let executor = PhaseExecutor::new(Arc::new(service.clone()), timeout);
    MigrationOrchestrator::new(executor, WorkflowCache::new(store))
}

/// Receive events until one matches `stop`, returning everything seen.
pub async fn events_until(
    events: &mut UnboundedReceiver<MigrationEvent>,
    stop: impl Fn(&MigrationEvent) -> bool,
) -> Vec<MigrationEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let done = stop(&event);
        seen.push(event);
        if done {
            break;
        }
    }
    seen
}

pub fn phase_started(number: u32) -> impl Fn(&MigrationEvent) -> bool {
    move |event| matches!(event, MigrationEvent::PhaseStarted { phase_number, .. } if *phase_number == number)
}
