use anyhow::{anyhow, Result};

use super::{activate, print_summary, Command};
use crate::cli::context::AppContext;
use crate::orchestrator::{MigrationEvent, MigrationOutcome};
use crate::project::ProjectRef;
use crate::steps::WorkflowStep;

pub struct RunCommand {
    pub project: ProjectRef,
    pub user: Option<String>,
    pub switch: bool,
    pub json: bool,
}

impl RunCommand {
    pub fn new(project: ProjectRef) -> Self {
        Self {
            project,
            user: None,
            switch: false,
            json: false,
        }
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn with_switch(mut self, switch: bool) -> Self {
        self.switch = switch;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn report(&self, event: &MigrationEvent) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(event)?);
            return Ok(());
        }

        match event {
            MigrationEvent::RunStarted {
                total_phases,
                resumed_phases,
                ..
            } => {
                if *resumed_phases > 0 {
                    println!(
                        "🔄 Resuming {} at phase {} of {}",
                        self.project,
                        resumed_phases + 1,
                        total_phases
                    );
                } else {
                    println!("🚀 Migrating {} in {} phases", self.project, total_phases);
                }
            }
            MigrationEvent::PhaseStarted {
                phase_number,
                phase_name,
                total_phases,
            } => {
                println!("⏳ Phase {phase_number}/{total_phases}: {phase_name}");
            }
            MigrationEvent::PhaseFinished {
                phase_number,
                error: Some(error),
                ..
            } => {
                println!("   ❌ Phase {phase_number} failed: {error}");
            }
            MigrationEvent::PhaseFinished {
                phase_number,
                error: None,
                snapshot,
            } => {
                let converted = snapshot
                    .phase_results
                    .last()
                    .map(|result| result.files_converted)
                    .unwrap_or_default();
                println!("   ✅ Phase {phase_number}: {converted} files converted");
            }
            MigrationEvent::CacheDegraded { message } => {
                println!("⚠️  Cache unavailable, continuing without checkpoints: {message}");
            }
            MigrationEvent::Completed { summary, .. } => {
                println!();
                print_summary(summary);
            }
            MigrationEvent::Cancelled { completed_phases } => {
                println!("🛑 Stopped after {completed_phases} phases. Run again to resume.");
            }
        }
        Ok(())
    }
}

impl Command for RunCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let mut lock = ctx.project_lock(&self.project)?;
        let _guard = lock.try_write().map_err(|_| {
            anyhow!(
                "Another phase-migrate process is already running {}",
                self.project
            )
        })?;

        let mut session = ctx.session(ctx.resolve_user(self.user.clone())?)?;
        activate(&mut session, &self.project, self.switch).await?;

        match session.step_state().current_step {
            WorkflowStep::Export => {
                println!("✅ {} is already migrated", self.project);
                println!("💡 Run 'phase-migrate status' for the summary, then 'phase-migrate export' to close it");
                return Ok(());
            }
            WorkflowStep::Transform => {}
            _ => {
                println!("📋 No phase plan cached for {}", self.project);
                println!("💡 Import one with 'phase-migrate plan import'");
                return Ok(());
            }
        }

        let mut run = session.start_or_fail_migration().await?;
        let mut interrupted = false;
        loop {
            tokio::select! {
                event = run.events.recv() => match event {
                    Some(event) => self.report(&event)?,
                    None => break,
                },
                _ = tokio::signal::ctrl_c(), if !interrupted => {
                    interrupted = true;
                    println!("🛑 Interrupted, stopping after the current phase...");
                    session.orchestrator().cancel(&self.project).await;
                }
            }
        }

        match session.finish_migration(run).await? {
            MigrationOutcome::Completed { cache_degraded, .. } if cache_degraded => {
                println!("⚠️  Progress was not fully saved; a later run may repeat phases");
            }
            _ => {}
        }
        Ok(())
    }
}
