//! Remote phase execution: the service contract, its HTTP client and the
//! timeout-bounded executor the orchestrator drives.

#[allow(clippy::module_inception)]
pub mod executor;
pub mod http;
pub mod mocks;
pub mod service;

pub use executor::{PhaseExecutor, PhaseFailure};
pub use http::HttpPhaseService;
pub use mocks::ScriptedPhaseService;
pub use service::{ExecutePhaseBody, ExecutePhaseResponse, PhaseRequest, PhaseService, ServiceError};

#[cfg(any(test, feature = "testing"))]
pub use service::MockPhaseService;
