// Caller-facing controller tying the step gate, the active project and the
// orchestrator together

use thiserror::Error;
use tracing::{info, warn};

use crate::cache::CacheError;
use crate::orchestrator::{
    MigrationError, MigrationOrchestrator, MigrationOutcome, MigrationRequest, MigrationRun,
};
use crate::project::{ProjectRef, UserIdentity};
use crate::steps::{StepGate, StepState, WorkflowStep};
use crate::workflow::{AnalysisResult, PhasePlan, PlanError, WorkflowCache, WorkflowProgress};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no project selected")]
    NoActiveProject,

    #[error("workflow is on step {current}, step {required} is required")]
    StepLocked {
        current: WorkflowStep,
        required: WorkflowStep,
    },

    #[error("invalid phase plan: {0}")]
    InvalidPlan(#[from] PlanError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("cache failure: {0}")]
    Cache(#[from] CacheError),
}

/// One user's view of the migration workflow.
///
/// The session owns the step gate and the ephemeral state of the current
/// run. Everything durable goes through the [`WorkflowCache`].
#[derive(Debug)]
pub struct MigrationSession {
    orchestrator: MigrationOrchestrator,
    user: UserIdentity,
    gate: StepGate,
    active: Option<ProjectRef>,
    last_progress: Option<WorkflowProgress>,
}

impl MigrationSession {
    pub fn new(orchestrator: MigrationOrchestrator, user: UserIdentity) -> Self {
        Self {
            orchestrator,
            user,
            gate: StepGate::new(),
            active: None,
            last_progress: None,
        }
    }

    pub fn cache(&self) -> &WorkflowCache {
        self.orchestrator.cache()
    }

    pub fn orchestrator(&self) -> &MigrationOrchestrator {
        &self.orchestrator
    }

    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    pub fn active_project(&self) -> Option<&ProjectRef> {
        self.active.as_ref()
    }

    pub fn step_state(&self) -> StepState {
        self.gate.state()
    }

    pub fn force_refresh(&self) -> bool {
        self.gate.force_refresh()
    }

    /// Progress of the most recent run in this session
    pub fn last_progress(&self) -> Option<&WorkflowProgress> {
        self.last_progress.as_ref()
    }

    pub fn go_to_step(&mut self, step: WorkflowStep) -> bool {
        self.gate.go_to_step(step)
    }

    /// Make `project` the active one. Switching away from another project
    /// drops that project's cached workflow and starts the gate over.
    pub async fn select_project(&mut self, project: ProjectRef) -> Result<(), SessionError> {
        let previous = match self.active.clone() {
            Some(active) => Some(active),
            None => read_or_warn(self.cache().active_project().await, "active project"),
        };

        let mut cleanup = Ok(());
        if let Some(previous) = previous.filter(|previous| *previous != project) {
            info!(from = %previous, to = %project, "Switching project");
            if self.orchestrator.runs().is_active(&previous) {
                self.orchestrator.cancel(&previous).await;
            }
            cleanup = self.cache().clear_all(&previous).await;
            if let Err(e) = &cleanup {
                warn!(project = %previous, error = %e, "Failed to clear cached state of previous project");
            }
            self.gate.reset();
            self.last_progress = None;
        }

        self.active = Some(project.clone());
        self.cache().set_active_project(&project).await?;
        Ok(cleanup?)
    }

    /// Restore the active project and step gate from the cache after a
    /// restart. Entries that cannot be read are treated as absent.
    pub async fn resume(&mut self) -> Option<ProjectRef> {
        let project = read_or_warn(self.cache().active_project().await, "active project")?;

        let plan = read_or_warn(self.cache().get_plan(&project).await, "phase plan");
        let progress = read_or_warn(self.cache().get_progress(&project).await, "progress");

        let mut completed = StepState::initial().completed_steps;
        let current = match &plan {
            Some(plan) if !plan.is_empty() => {
                completed.insert(WorkflowStep::Analyze);
                match &progress {
                    Some(progress) if progress.is_complete_for(plan) => {
                        completed.insert(WorkflowStep::Transform);
                        WorkflowStep::Export
                    }
                    _ => WorkflowStep::Transform,
                }
            }
            _ => WorkflowStep::Upload,
        };

        self.gate = StepGate::from_state(&StepState {
            current_step: current,
            completed_steps: completed,
        });
        self.last_progress = progress;
        self.active = Some(project.clone());
        info!(project = %project, step = %current, "Resumed workflow");
        Some(project)
    }

    /// Store the analysis output for the active project and move on to
    /// Transform. Progress from an earlier plan is discarded.
    pub async fn import_plan(
        &mut self,
        analysis: Option<AnalysisResult>,
        plan: PhasePlan,
    ) -> Result<(), SessionError> {
        let project = self.active.clone().ok_or(SessionError::NoActiveProject)?;
        plan.validate()?;

        if let Some(analysis) = &analysis {
            self.cache().save_analysis(&project, analysis).await?;
        }
        self.cache().save_plan(&project, &plan).await?;
        self.cache().clear_progress(&project).await?;
        self.last_progress = None;

        self.gate.complete_step(WorkflowStep::Upload);
        self.gate.complete_step(WorkflowStep::Analyze);
        info!(project = %project, phases = plan.len(), "Imported phase plan");
        Ok(())
    }

    /// Start, or resume, the migration of the active project.
    pub async fn start_or_fail_migration(&mut self) -> Result<MigrationRun, SessionError> {
        let project = self.active.clone().ok_or(SessionError::NoActiveProject)?;
        self.require_step(WorkflowStep::Transform)?;

        let request = MigrationRequest::new(project, self.user.clone());
        Ok(self.orchestrator.start(request).await?)
    }

    /// Wait for a run started by this session and apply its outcome.
    pub async fn finish_migration(&mut self, run: MigrationRun) -> Result<MigrationOutcome, SessionError> {
        let project = run.token.project.clone();
        let outcome = run.finish().await?;

        if let MigrationOutcome::Completed { progress, .. } = &outcome {
            if self.active.as_ref() == Some(&project) {
                self.last_progress = Some(progress.clone());
                self.gate.complete_step(WorkflowStep::Transform);
            }
        }
        Ok(outcome)
    }

    /// Abandon the workflow of `project`: stop its run, discard remote and
    /// cached state, and start the gate over.
    pub async fn cancel_migration(&mut self, project: &ProjectRef) -> Result<(), SessionError> {
        self.orchestrator.cancel(project).await;

        if let Err(e) = self
            .orchestrator
            .executor()
            .service()
            .discard_project(project, &self.user)
            .await
        {
            warn!(project = %project, error = %e, "Failed to discard remote project state");
        }

        let mut cleanup = self.cache().clear_all(project).await;

        let pointer = read_or_warn(self.cache().active_project().await, "active project");
        if self.active.as_ref() == Some(project) || pointer.as_ref() == Some(project) {
            if let Err(e) = self.cache().clear_active_project().await {
                cleanup = cleanup.and(Err(e));
            }
        }
        if self.active.as_ref() == Some(project) {
            self.active = None;
        }

        self.last_progress = None;
        self.gate.reset();

        if let Err(e) = &cleanup {
            warn!(project = %project, error = %e, "Migration cancelled, cached state not fully removed");
        } else {
            info!(project = %project, "Migration cancelled");
        }
        Ok(cleanup?)
    }

    /// Leave the Export step. The cached artifacts stay available for
    /// inspection but the next session starts a new workflow.
    pub async fn finish_export(&mut self) -> Result<(), SessionError> {
        self.require_step(WorkflowStep::Export)?;
        self.gate.complete_step(WorkflowStep::Export);
        self.active = None;
        self.last_progress = None;
        self.cache().clear_active_project().await?;
        Ok(())
    }

    fn require_step(&self, required: WorkflowStep) -> Result<(), SessionError> {
        let current = self.gate.current_step();
        if current != required {
            return Err(SessionError::StepLocked { current, required });
        }
        Ok(())
    }
}

fn read_or_warn<T>(read: Result<Option<T>, CacheError>, what: &str) -> Option<T> {
    read.unwrap_or_else(|e| {
        warn!(error = %e, "Could not read cached {what}, treating it as absent");
        None
    })
}
