use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{activate, Command};
use crate::cli::context::AppContext;
use crate::project::ProjectRef;
use crate::workflow::{AnalysisResult, Phase, PhasePlan};

pub struct PlanImportCommand {
    pub project: ProjectRef,
    pub file: PathBuf,
    pub analysis: Option<PathBuf>,
    pub switch: bool,
}

impl PlanImportCommand {
    pub fn new(project: ProjectRef, file: PathBuf) -> Self {
        Self {
            project,
            file,
            analysis: None,
            switch: false,
        }
    }

    pub fn with_analysis(mut self, analysis: Option<PathBuf>) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_switch(mut self, switch: bool) -> Self {
        self.switch = switch;
        self
    }
}

impl Command for PlanImportCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let plan = read_plan(&self.file)?;
        let analysis = match &self.analysis {
            Some(path) => Some(AnalysisResult(read_json(path)?)),
            None => None,
        };

        let mut session = ctx.session(ctx.resolve_user(None)?)?;
        activate(&mut session, &self.project, self.switch).await?;
        session.import_plan(analysis, plan.clone()).await?;

        println!("📋 Imported {} phases for {}", plan.len(), self.project);
        for phase in &plan.phases {
            println!(
                "   {}. {} ({} files)",
                phase.number,
                phase.name,
                phase.file_list.len()
            );
        }
        println!();
        println!(
            "💡 Run 'phase-migrate run --owner {} --repo {}' to start",
            self.project.owner(),
            self.project.repo()
        );
        Ok(())
    }
}

/// Accepts `{"phases": [...]}` or a bare array of phases.
pub fn read_plan(path: &Path) -> Result<PhasePlan> {
    let value = read_json(path)?;
    let plan = if value.is_array() {
        PhasePlan::new(serde_json::from_value::<Vec<Phase>>(value)?)
    } else {
        serde_json::from_value(value)?
    };
    Ok(plan)
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}
