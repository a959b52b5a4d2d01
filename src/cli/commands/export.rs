use anyhow::{anyhow, Result};

use super::{activate, Command};
use crate::cli::context::AppContext;
use crate::project::ProjectRef;
use crate::steps::WorkflowStep;

pub struct ExportCommand {
    pub project: ProjectRef,
    pub user: Option<String>,
}

impl ExportCommand {
    pub fn new(project: ProjectRef) -> Self {
        Self { project, user: None }
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }
}

impl Command for ExportCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let mut lock = ctx.project_lock(&self.project)?;
        let _guard = lock.try_write().map_err(|_| {
            anyhow!(
                "Another phase-migrate process is already running {}",
                self.project
            )
        })?;

        let mut session = ctx.session(ctx.resolve_user(self.user.clone())?)?;
        activate(&mut session, &self.project, false).await?;

        if session.step_state().current_step != WorkflowStep::Export {
            println!("⏳ {} has not finished migrating yet", self.project);
            println!("💡 Run 'phase-migrate run' to complete the remaining phases");
            return Ok(());
        }

        session.finish_export().await?;
        println!("📦 Finished the migration of {}", self.project);
        println!("   Cached results stay available to 'phase-migrate status'");
        println!("   The next 'plan import' starts a new workflow");
        Ok(())
    }
}
