use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::project::ProjectRef;

pub mod commands;
pub mod context;

#[derive(Parser)]
#[command(name = "phase-migrate")]
#[command(about = "Resumable, phase-by-phase code migration runner")]
#[command(long_about = "phase-migrate drives an externally planned code migration one phase at a time \
                       against a remote conversion service. Progress is checkpointed after every phase, \
                       so an interrupted run picks up where it stopped. Get started with \
                       'phase-migrate plan import'.")]
pub struct Cli {
    /// Extra configuration file layered over phase-migrate.toml
    #[arg(long, global = true, help = "Path to an additional TOML configuration file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Repository owner
    #[arg(long)]
    pub owner: String,
    /// Repository name
    #[arg(long)]
    pub repo: String,
}

impl ProjectArgs {
    pub fn project(&self) -> anyhow::Result<ProjectRef> {
        Ok(ProjectRef::new(self.owner.clone(), self.repo.clone())?)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the phase plan produced by analysis
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },
    /// Run the remaining phases of the active project
    Run {
        #[command(flatten)]
        project: ProjectArgs,
        /// User id sent to the conversion service
        #[arg(long, help = "Overrides identity.user from the configuration")]
        user: Option<String>,
        /// Make this the active project even if another one is in progress
        #[arg(long, help = "Switch projects, discarding the cached state of the previous one")]
        switch: bool,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Show cached progress for a project
    Status {
        #[command(flatten)]
        project: ProjectArgs,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Abandon a project's migration and discard its cached state
    Cancel {
        #[command(flatten)]
        project: ProjectArgs,
        #[arg(long, help = "Overrides identity.user from the configuration")]
        user: Option<String>,
    },
    /// Close a fully migrated project so the next plan starts a new workflow
    Export {
        #[command(flatten)]
        project: ProjectArgs,
        #[arg(long, help = "Overrides identity.user from the configuration")]
        user: Option<String>,
    },
    /// Inspect and maintain the workflow cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum PlanAction {
    /// Store a phase plan (JSON) for a project
    Import {
        #[command(flatten)]
        project: ProjectArgs,
        /// Plan file: either {"phases": [...]} or a bare array of phases
        file: PathBuf,
        /// Optional analysis result to cache alongside the plan
        #[arg(long)]
        analysis: Option<PathBuf>,
        #[arg(long, help = "Switch projects, discarding the cached state of the previous one")]
        switch: bool,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// List every stored key, including expired ones not yet evicted
    List,
    /// Evict expired entries
    PurgeExpired,
    /// Remove every entry in the namespace
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}
