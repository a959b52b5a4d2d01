use thiserror::Error;
use uuid::Uuid;

use crate::cache::CacheError;
use crate::project::ProjectRef;
use crate::workflow::{PlanError, ProgressError};

/// Fatal orchestration failures. Per-phase failures are never surfaced here;
/// they are folded into the progress as failing phase results.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("no phase plan cached for {project}")]
    NoPlanFound { project: ProjectRef },

    #[error("cached phase plan for {project} is invalid: {source}")]
    InvalidPlan {
        project: ProjectRef,
        #[source]
        source: PlanError,
    },

    #[error("phase plan for {project} could not be read: {source}")]
    PlanUnavailable {
        project: ProjectRef,
        #[source]
        source: CacheError,
    },

    #[error("a migration of {project} is already running (run {run_id})")]
    AlreadyRunning { project: ProjectRef, run_id: Uuid },

    #[error("progress out of order: {0}")]
    Progress(#[from] ProgressError),

    #[error("migration task aborted: {0}")]
    Aborted(String),
}

impl MigrationError {
    /// Stable short code used by the CLI for exit reporting
    pub fn code(&self) -> &'static str {
        match self {
            MigrationError::NoPlanFound { .. } => "NO_PLAN_FOUND",
            MigrationError::InvalidPlan { .. } => "INVALID_PLAN",
            MigrationError::PlanUnavailable { .. } => "CACHE_FAILURE",
            MigrationError::AlreadyRunning { .. } => "ALREADY_RUNNING",
            MigrationError::Progress(_) => "INVALID_PROGRESS",
            MigrationError::Aborted(_) => "ABORTED",
        }
    }
}
