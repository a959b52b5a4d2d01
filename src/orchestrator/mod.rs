//! Phase-by-phase migration runs: ordering, resumption, checkpointing and
//! cooperative cancellation.

pub mod errors;
pub mod events;
#[allow(clippy::module_inception)]
pub mod orchestrator;
pub mod run_token;

pub use errors::MigrationError;
pub use events::{MigrationEvent, MigrationOutcome, MigrationRequest};
pub use orchestrator::{MigrationOrchestrator, MigrationRun};
pub use run_token::{CancelFlag, RunGuard, RunRegistry, RunToken};
