use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::keys::{CacheKeys, ACTIVE_PROJECT_KEY};
use super::types::{AnalysisResult, PhasePlan, WorkflowProgress};
use crate::cache::{CacheError, CacheStore};
use crate::observability::cache_metrics;
use crate::project::ProjectRef;

/// Typed façade over the cache store holding the three workflow artifacts
/// of each project plus the active-project pointer.
#[derive(Clone)]
pub struct WorkflowCache {
    store: Arc<dyn CacheStore>,
    ttl: Option<Duration>,
}

impl WorkflowCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store, ttl: None }
    }

    /// Expire every artifact written through this façade after `ttl`.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    async fn write<T: serde::Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let result = self.store.set_json(key, value, self.ttl).await;
        if result.is_err() {
            cache_metrics().record_write_failure();
        }
        result
    }

    pub async fn get_analysis(&self, project: &ProjectRef) -> Result<Option<AnalysisResult>, CacheError> {
        self.store.get_json(&CacheKeys::analysis(project)).await
    }

    pub async fn save_analysis(
        &self,
        project: &ProjectRef,
        analysis: &AnalysisResult,
    ) -> Result<(), CacheError> {
        self.write(&CacheKeys::analysis(project), analysis).await
    }

    pub async fn get_plan(&self, project: &ProjectRef) -> Result<Option<PhasePlan>, CacheError> {
        self.store.get_json(&CacheKeys::phase_plan(project)).await
    }

    pub async fn save_plan(&self, project: &ProjectRef, plan: &PhasePlan) -> Result<(), CacheError> {
        self.write(&CacheKeys::phase_plan(project), plan).await
    }

    pub async fn get_progress(&self, project: &ProjectRef) -> Result<Option<WorkflowProgress>, CacheError> {
        self.store.get_json(&CacheKeys::progress(project)).await
    }

    pub async fn save_progress(
        &self,
        project: &ProjectRef,
        progress: &WorkflowProgress,
    ) -> Result<(), CacheError> {
        self.write(&CacheKeys::progress(project), progress).await?;
        debug!(
            project = %project,
            completed_phases = progress.completed_phases(),
            "Saved workflow progress"
        );
        Ok(())
    }

    pub async fn active_project(&self) -> Result<Option<ProjectRef>, CacheError> {
        self.store.get_json(ACTIVE_PROJECT_KEY).await
    }

    /// The pointer never expires; it is replaced or cleared explicitly.
    pub async fn set_active_project(&self, project: &ProjectRef) -> Result<(), CacheError> {
        let result = self.store.set_json(ACTIVE_PROJECT_KEY, project, None).await;
        if result.is_err() {
            cache_metrics().record_write_failure();
        }
        result
    }

    pub async fn clear_active_project(&self) -> Result<(), CacheError> {
        self.store.remove(ACTIVE_PROJECT_KEY).await
    }

    /// Remove analysis, plan and progress for one project. Every key is
    /// attempted; the first failure is returned.
    pub async fn clear_all(&self, project: &ProjectRef) -> Result<(), CacheError> {
        let mut first_error = None;
        for key in CacheKeys::all(project) {
            if let Err(e) = self.store.remove(&key).await {
                warn!(key = %key, error = %e, "Failed to remove cached entry");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                info!(project = %project, "Cleared cached workflow state");
                Ok(())
            }
        }
    }

    pub async fn clear_progress(&self, project: &ProjectRef) -> Result<(), CacheError> {
        self.store.remove(&CacheKeys::progress(project)).await
    }

    /// Wipe the whole namespace.
    pub async fn clear_everything(&self) -> Result<(), CacheError> {
        self.store.clear().await?;
        info!("Cleared all cached workflow state");
        Ok(())
    }
}

impl std::fmt::Debug for WorkflowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
