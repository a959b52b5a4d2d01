use anyhow::{bail, Result};

use crate::cli::context::AppContext;
use crate::project::ProjectRef;
use crate::session::MigrationSession;
use crate::workflow::MigrationSummary;

pub mod cache;
pub mod cancel;
pub mod export;
pub mod plan;
pub mod run;
pub mod status;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self, ctx: &AppContext) -> Result<()>;
}

/// Resume the cached session and make `project` active. Refuses to replace
/// a different active project unless `switch` is set.
pub async fn activate(session: &mut MigrationSession, project: &ProjectRef, switch: bool) -> Result<()> {
    session.resume().await;
    let active = session.active_project().cloned();
    match active {
        Some(active) if active == *project => Ok(()),
        Some(active) if !switch => bail!(
            "{active} is the active project. Cancel it first or pass --switch to discard its state"
        ),
        _ => {
            session.select_project(project.clone()).await?;
            Ok(())
        }
    }
}

pub fn print_summary(summary: &MigrationSummary) {
    println!("📊 SUMMARY:");
    println!(
        "   Phases: {}/{} completed",
        summary.completed_phases, summary.total_phases
    );
    if !summary.failed_phases.is_empty() {
        let failed: Vec<String> = summary.failed_phases.iter().map(|n| n.to_string()).collect();
        println!("   ❌ Phases with failures: {}", failed.join(", "));
    }
    println!(
        "   Files: {} converted, {}% successful",
        summary.total_files, summary.success_rate
    );
    if !summary.dependencies.is_empty() {
        let deps: Vec<&str> = summary.dependencies.iter().map(String::as_str).collect();
        println!("   📦 Dependencies: {}", deps.join(", "));
    }
}
