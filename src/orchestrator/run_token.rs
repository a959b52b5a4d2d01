use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::project::ProjectRef;

/// Cooperative cancellation signal, checked between phases.
///
/// Raising the flag and persisting a checkpoint are serialized, so once
/// `cancel` returns no further checkpoint of the run can reach the cache.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    checkpoint: Arc<tokio::sync::Mutex<()>>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cancel(&self) {
        let _checkpoint = self.checkpoint.lock().await;
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Hold while checking the flag and writing a checkpoint.
    pub async fn checkpoint(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.checkpoint.lock().await
    }
}

/// Identity of one orchestration run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunToken {
    pub id: Uuid,
    pub project: ProjectRef,
    pub started_at: DateTime<Utc>,
    pub holder: String,
}

#[derive(Debug)]
struct ActiveRun {
    token: RunToken,
    cancel: CancelFlag,
}

/// At most one active run per project. A second start for a project that
/// already holds a token is rejected.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    active: Arc<Mutex<HashMap<ProjectRef, ActiveRun>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<ProjectRef, ActiveRun>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate a token for `project`, or hand back the one already active.
    pub fn acquire(&self, project: &ProjectRef) -> Result<RunGuard, RunToken> {
        let mut runs = self.runs();
        if let Some(existing) = runs.get(project) {
            return Err(existing.token.clone());
        }

        let token = RunToken {
            id: Uuid::new_v4(),
            project: project.clone(),
            started_at: Utc::now(),
            holder: hostname::get()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
        };
        let cancel = CancelFlag::new();
        runs.insert(
            project.clone(),
            ActiveRun {
                token: token.clone(),
                cancel: cancel.clone(),
            },
        );
        debug!(project = %project, run_token = %token.id, "Acquired run token");

        Ok(RunGuard {
            registry: self.clone(),
            token,
            cancel,
        })
    }

    pub fn active_token(&self, project: &ProjectRef) -> Option<RunToken> {
        self.runs().get(project).map(|run| run.token.clone())
    }

    pub fn is_active(&self, project: &ProjectRef) -> bool {
        self.runs().contains_key(project)
    }

    /// Signal the active run for `project`, if any. Returns whether one was
    /// running.
    pub async fn cancel(&self, project: &ProjectRef) -> bool {
        let flag = self.runs().get(project).map(|run| run.cancel.clone());
        match flag {
            Some(flag) => {
                flag.cancel().await;
                true
            }
            None => false,
        }
    }

    fn release(&self, token: &RunToken) {
        let mut runs = self.runs();
        // A newer run may already own the slot
        if runs.get(&token.project).is_some_and(|run| run.token.id == token.id) {
            runs.remove(&token.project);
            debug!(project = %token.project, run_token = %token.id, "Released run token");
        }
    }
}

/// Holds a project's run slot until dropped
#[derive(Debug)]
pub struct RunGuard {
    registry: RunRegistry,
    token: RunToken,
    cancel: CancelFlag,
}

impl RunGuard {
    pub fn token(&self) -> &RunToken {
        &self.token
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.release(&self.token);
    }
}
