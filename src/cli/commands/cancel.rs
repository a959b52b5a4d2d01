use anyhow::Result;

use super::Command;
use crate::cli::context::AppContext;
use crate::project::ProjectRef;

pub struct CancelCommand {
    pub project: ProjectRef,
    pub user: Option<String>,
}

impl CancelCommand {
    pub fn new(project: ProjectRef) -> Self {
        Self { project, user: None }
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }
}

impl Command for CancelCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let mut lock = ctx.project_lock(&self.project)?;
        let Ok(_guard) = lock.try_write() else {
            println!(
                "⚠️  A run of {} is in progress in another process; stop it before cancelling",
                self.project
            );
            return Ok(());
        };

        let mut session = ctx.session(ctx.resolve_user(self.user.clone())?)?;
        session.resume().await;
        session.cancel_migration(&self.project).await?;

        println!("🗑️  Cancelled migration of {}", self.project);
        println!("   Cached plan and progress removed");
        Ok(())
    }
}
