// phase-migrate library - resumable, phase-by-phase code migration
// This exposes the core components for testing and integration

pub mod cache;
pub mod cli;
pub mod config;
pub mod executor;
pub mod observability;
pub mod orchestrator;
pub mod project;
pub mod session;
pub mod steps;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use cache::{CacheError, CacheStore, FileCacheStore, MemoryCacheStore};
pub use config::{config, init_config, MigrateConfig};
pub use executor::{HttpPhaseService, PhaseExecutor, PhaseFailure, PhaseService, ScriptedPhaseService, ServiceError};
pub use observability::{cache_metrics, phase_metrics, OperationTimer};
pub use orchestrator::{
    MigrationError, MigrationEvent, MigrationOrchestrator, MigrationOutcome, MigrationRequest, MigrationRun,
};
pub use project::{ProjectRef, UserIdentity};
pub use session::{MigrationSession, SessionError};
pub use steps::{StepGate, StepState, WorkflowStep};
pub use telemetry::{create_migration_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use workflow::{PhasePlan, PhaseResult, WorkflowCache, WorkflowProgress};
