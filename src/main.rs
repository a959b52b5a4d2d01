use anyhow::Result;
use clap::Parser;

use phase_migrate::cli::commands::cache::CacheCommand;
use phase_migrate::cli::commands::cancel::CancelCommand;
use phase_migrate::cli::commands::export::ExportCommand;
use phase_migrate::cli::commands::plan::PlanImportCommand;
use phase_migrate::cli::commands::run::RunCommand;
use phase_migrate::cli::commands::status::StatusCommand;
use phase_migrate::cli::commands::Command;
use phase_migrate::cli::context::AppContext;
use phase_migrate::cli::{Cli, Commands, PlanAction};
use phase_migrate::config::MigrateConfig;
use phase_migrate::telemetry::{init_telemetry, shutdown_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = MigrateConfig::load_env_file();
    let config = MigrateConfig::load_from(cli.config.as_deref())?;
    init_telemetry(&config.observability)?;
    let metrics_enabled = config.observability.metrics_enabled;

    let result = tokio::runtime::Runtime::new()?.block_on(dispatch(cli.command, config));

    if metrics_enabled {
        shutdown_telemetry();
    }
    result
}

async fn dispatch(command: Commands, config: MigrateConfig) -> Result<()> {
    let ctx = AppContext::new(config).await?;
    match command {
        Commands::Plan {
            action:
                PlanAction::Import {
                    project,
                    file,
                    analysis,
                    switch,
                },
        } => {
            PlanImportCommand::new(project.project()?, file)
                .with_analysis(analysis)
                .with_switch(switch)
                .execute(&ctx)
                .await
        }
        Commands::Run {
            project,
            user,
            switch,
            json,
        } => {
            RunCommand::new(project.project()?)
                .with_user(user)
                .with_switch(switch)
                .with_json(json)
                .execute(&ctx)
                .await
        }
        Commands::Status { project, json } => {
            StatusCommand::new(project.project()?)
                .with_json(json)
                .execute(&ctx)
                .await
        }
        Commands::Cancel { project, user } => {
            CancelCommand::new(project.project()?)
                .with_user(user)
                .execute(&ctx)
                .await
        }
        Commands::Export { project, user } => {
            ExportCommand::new(project.project()?)
                .with_user(user)
                .execute(&ctx)
                .await
        }
        Commands::Cache { action } => CacheCommand::new(action).execute(&ctx).await,
    }
}
