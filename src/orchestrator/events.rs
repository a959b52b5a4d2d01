use serde::Serialize;
use uuid::Uuid;

use crate::project::{ProjectRef, UserIdentity};
use crate::workflow::{MigrationSummary, WorkflowProgress};

/// Who is migrating what
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    pub project: ProjectRef,
    pub user: UserIdentity,
}

impl MigrationRequest {
    pub fn new(project: ProjectRef, user: UserIdentity) -> Self {
        Self { project, user }
    }
}

/// Progress notifications emitted while a run advances. Every phase
/// completion carries a full snapshot of the accumulated progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum MigrationEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted {
        run_id: Uuid,
        total_phases: u32,
        resumed_phases: u32,
    },
    #[serde(rename_all = "camelCase")]
    PhaseStarted {
        phase_number: u32,
        phase_name: String,
        total_phases: u32,
    },
    #[serde(rename_all = "camelCase")]
    PhaseFinished {
        phase_number: u32,
        error: Option<String>,
        snapshot: WorkflowProgress,
    },
    #[serde(rename_all = "camelCase")]
    CacheDegraded { message: String },
    #[serde(rename_all = "camelCase")]
    Completed {
        snapshot: WorkflowProgress,
        summary: MigrationSummary,
    },
    #[serde(rename_all = "camelCase")]
    Cancelled { completed_phases: u32 },
}

impl MigrationEvent {
    /// Progress snapshot carried by the event, if any
    pub fn snapshot(&self) -> Option<&WorkflowProgress> {
        match self {
            MigrationEvent::PhaseFinished { snapshot, .. } | MigrationEvent::Completed { snapshot, .. } => {
                Some(snapshot)
            }
            _ => None,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOutcome {
    Completed {
        progress: WorkflowProgress,
        summary: MigrationSummary,
        /// Set when checkpoints stopped reaching the cache during the run
        cache_degraded: bool,
    },
    Cancelled {
        progress: WorkflowProgress,
    },
}

impl MigrationOutcome {
    pub fn progress(&self) -> &WorkflowProgress {
        match self {
            MigrationOutcome::Completed { progress, .. } | MigrationOutcome::Cancelled { progress } => progress,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MigrationOutcome::Cancelled { .. })
    }
}
