use anyhow::Result;
use serde::Serialize;

use super::{print_summary, Command};
use crate::cli::context::AppContext;
use crate::project::ProjectRef;
use crate::workflow::{MigrationSummary, WorkflowProgress};

pub struct StatusCommand {
    pub project: ProjectRef,
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    project: String,
    active: bool,
    plan_phases: Option<u32>,
    summary: Option<MigrationSummary>,
}

impl StatusCommand {
    pub fn new(project: ProjectRef) -> Self {
        Self {
            project,
            json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Command for StatusCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let cache = &ctx.cache;
        let active = cache.active_project().await?.as_ref() == Some(&self.project);
        let plan = cache.get_plan(&self.project).await?;
        let total_phases = plan.as_ref().map(|plan| plan.total_phases());
        let progress = cache.get_progress(&self.project).await?;
        let summary = progress
            .as_ref()
            .map(|progress| progress.summary(total_phases.unwrap_or_default()));

        if self.json {
            let report = StatusReport {
                project: self.project.to_string(),
                active,
                plan_phases: total_phases,
                summary,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!(
            "🔍 {}{}",
            self.project,
            if active { " (active)" } else { "" }
        );
        match total_phases {
            Some(phases) => println!("   📋 Plan: {phases} phases"),
            None => {
                println!("   📋 No phase plan cached");
                return Ok(());
            }
        }

        match (progress, summary) {
            (Some(progress), Some(summary)) => {
                print_phases(&progress);
                println!();
                print_summary(&summary);
            }
            _ => println!("   ⏸️  Not started"),
        }
        Ok(())
    }
}

fn print_phases(progress: &WorkflowProgress) {
    for result in &progress.phase_results {
        let marker = if result.has_failures() { "❌" } else { "✅" };
        println!(
            "   {marker} {}. {} ({}/{} conversions ok)",
            result.phase_number,
            result.phase_name,
            result.successful_conversions(),
            result.conversions.len()
        );
    }
}
