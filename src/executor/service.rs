use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::project::{ProjectRef, UserIdentity};
use crate::workflow::PhaseResult;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Failures reported by the remote phase execution service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("remote service returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("invalid response from remote service: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::InvalidResponse(err.to_string())
        } else {
            ServiceError::Network(err.to_string())
        }
    }
}

/// Identifies one remote phase execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRequest {
    pub project: ProjectRef,
    pub user: UserIdentity,
    pub phase_number: u32,
    pub is_last_phase: bool,
}

/// JSON body of a phase execution call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePhaseBody {
    pub user_id: String,
    pub phase_number: u32,
    pub is_last_phase: bool,
}

impl From<&PhaseRequest> for ExecutePhaseBody {
    fn from(request: &PhaseRequest) -> Self {
        Self {
            user_id: request.user.as_str().to_string(),
            phase_number: request.phase_number,
            is_last_phase: request.is_last_phase,
        }
    }
}

/// JSON reply of a phase execution call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePhaseResponse {
    pub phase_results: PhaseResult,
}

/// Remote code-transformation service, treated as a black-box RPC.
///
/// Each call returns the complete result of one phase. Calls must be safe
/// to repeat when a run resumes from a cached checkpoint.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait PhaseService: Send + Sync {
    async fn execute_phase(&self, request: &PhaseRequest) -> Result<PhaseResult, ServiceError>;

    /// Delete whatever the service holds for the project.
    async fn discard_project(&self, project: &ProjectRef, user: &UserIdentity) -> Result<(), ServiceError>;
}
