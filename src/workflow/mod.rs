// Workflow data model and the typed cache façade over it

pub mod cache;
pub mod keys;
pub mod types;

pub use cache::WorkflowCache;
pub use keys::{CacheKeys, ACTIVE_PROJECT_KEY};
pub use types::{
    AnalysisResult, ConversionOutcome, MigrationSummary, Phase, PhasePlan, PhaseResult, PlanError,
    ProgressError, WorkflowProgress, UNSPECIFIED_CONVERSION_ERROR,
};
