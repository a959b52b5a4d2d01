use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::service::{PhaseRequest, PhaseService, ServiceError};
use crate::observability::{phase_metrics, OperationTimer};
use crate::project::{ProjectRef, UserIdentity};
use crate::workflow::{Phase, PhaseResult, UNSPECIFIED_CONVERSION_ERROR};

/// Why a single phase produced no usable result
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PhaseFailure {
    #[error("phase {phase_number} timed out after {}s", .after.as_secs())]
    Timeout { phase_number: u32, after: Duration },

    #[error("phase {phase_number} failed: {source}")]
    Service {
        phase_number: u32,
        #[source]
        source: ServiceError,
    },
}

/// Runs exactly one phase against the remote service, bounded by a timeout,
/// and checks the returned result against the data-model invariants.
#[derive(Clone)]
pub struct PhaseExecutor {
    service: Arc<dyn PhaseService>,
    timeout: Duration,
}

impl PhaseExecutor {
    pub fn new(service: Arc<dyn PhaseService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub fn service(&self) -> &Arc<dyn PhaseService> {
        &self.service
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run(
        &self,
        project: &ProjectRef,
        user: &UserIdentity,
        phase: &Phase,
        is_last_phase: bool,
    ) -> Result<PhaseResult, PhaseFailure> {
        let request = PhaseRequest {
            project: project.clone(),
            user: user.clone(),
            phase_number: phase.number,
            is_last_phase,
        };

        phase_metrics().record_started();
        let timer = OperationTimer::new(&format!("phase {}", phase.number));

        let outcome = tokio::time::timeout(self.timeout, self.service.execute_phase(&request)).await;
        let result = match outcome {
            Err(_) => {
                phase_metrics().record_timed_out();
                Err(PhaseFailure::Timeout {
                    phase_number: phase.number,
                    after: self.timeout,
                })
            }
            Ok(Err(source)) => Err(PhaseFailure::Service {
                phase_number: phase.number,
                source,
            }),
            Ok(Ok(result)) => normalize(phase, result),
        };

        match &result {
            Ok(_) => {
                phase_metrics().record_succeeded();
                timer.finish();
            }
            Err(failure) => {
                phase_metrics().record_failed();
                warn!(
                    phase = phase.number,
                    elapsed_ms = timer.elapsed().as_millis() as u64,
                    error = %failure,
                    "Phase execution failed"
                );
            }
        }
        result
    }
}

impl std::fmt::Debug for PhaseExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseExecutor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Reject results for the wrong phase and repair outcomes that break the
/// success/error invariant.
fn normalize(phase: &Phase, mut result: PhaseResult) -> Result<PhaseResult, PhaseFailure> {
    if result.phase_number != phase.number {
        return Err(PhaseFailure::Service {
            phase_number: phase.number,
            source: ServiceError::InvalidResponse(format!(
                "expected result for phase {}, got phase {}",
                phase.number, result.phase_number
            )),
        });
    }

    if result.phase_name.is_empty() {
        result.phase_name = phase.name.clone();
    }

    for conversion in &mut result.conversions {
        if conversion.success && conversion.converted_code.is_empty() {
            debug!(file = %conversion.source_file, "Downgrading conversion without output to failure");
            conversion.success = false;
            conversion.error = Some("no converted code returned".to_string());
        } else if !conversion.success && conversion.error_message().is_none() {
            conversion.error = Some(UNSPECIFIED_CONVERSION_ERROR.to_string());
        }
    }
    Ok(result)
}
