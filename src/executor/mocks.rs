// Scripted phase service for tests and dry runs - no network side effects

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::service::{PhaseRequest, PhaseService, ServiceError};
use crate::project::{ProjectRef, UserIdentity};
use crate::workflow::{ConversionOutcome, PhaseResult};

type PhaseHook = Arc<dyn Fn(&PhaseRequest) + Send + Sync>;

#[derive(Default)]
struct Script {
    results: HashMap<u32, PhaseResult>,
    failures: HashMap<u32, ServiceError>,
    delays: HashMap<u32, Duration>,
    hooks: HashMap<u32, PhaseHook>,
    discard_error: Option<ServiceError>,
    executed: Vec<PhaseRequest>,
    discarded: Vec<ProjectRef>,
}

/// Phase service answering from a script.
///
/// Phases without a scripted result succeed with one converted file.
#[derive(Clone, Default)]
pub struct ScriptedPhaseService {
    script: Arc<Mutex<Script>>,
}

impl ScriptedPhaseService {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_result(self, result: PhaseResult) -> Self {
        self.script().results.insert(result.phase_number, result);
        self
    }

    pub fn fail_phase(self, phase_number: u32, error: ServiceError) -> Self {
        self.script().failures.insert(phase_number, error);
        self
    }

    /// Make a phase take `delay` before answering
    pub fn delay_phase(self, phase_number: u32, delay: Duration) -> Self {
        self.script().delays.insert(phase_number, delay);
        self
    }

    /// Run `hook` when the phase is called, before it answers
    pub fn on_phase(self, phase_number: u32, hook: impl Fn(&PhaseRequest) + Send + Sync + 'static) -> Self {
        self.script().hooks.insert(phase_number, Arc::new(hook));
        self
    }

    pub fn fail_discard(self, error: ServiceError) -> Self {
        self.script().discard_error = Some(error);
        self
    }

    pub fn executed_phases(&self) -> Vec<u32> {
        self.script().executed.iter().map(|r| r.phase_number).collect()
    }

    pub fn executed_requests(&self) -> Vec<PhaseRequest> {
        self.script().executed.clone()
    }

    pub fn discarded_projects(&self) -> Vec<ProjectRef> {
        self.script().discarded.clone()
    }

    /// Result converting every file in `files`, each reporting `dependencies`
    pub fn converted(phase_number: u32, phase_name: &str, files: &[&str], dependencies: &[&str]) -> PhaseResult {
        PhaseResult {
            phase_number,
            phase_name: phase_name.to_string(),
            files_converted: files.len() as u32,
            conversions: files
                .iter()
                .map(|file| ConversionOutcome {
                    source_file: file.to_string(),
                    target_file: format!("{file}.ts"),
                    source_code: format!("// {file}"),
                    converted_code: format!("// converted {file}"),
                    dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
                    success: true,
                    error: None,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl PhaseService for ScriptedPhaseService {
    async fn execute_phase(&self, request: &PhaseRequest) -> Result<PhaseResult, ServiceError> {
        let (delay, hook) = {
            let mut script = self.script();
            script.executed.push(request.clone());
            (
                script.delays.get(&request.phase_number).copied(),
                script.hooks.get(&request.phase_number).cloned(),
            )
        };

        if let Some(hook) = hook {
            hook(request);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.script();
        if let Some(error) = script.failures.get(&request.phase_number) {
            return Err(error.clone());
        }
        Ok(script
            .results
            .get(&request.phase_number)
            .cloned()
            .unwrap_or_else(|| {
                let file = format!("phase{}/index.js", request.phase_number);
                Self::converted(
                    request.phase_number,
                    &format!("Phase {}", request.phase_number),
                    &[file.as_str()],
                    &[],
                )
            }))
    }

    async fn discard_project(&self, project: &ProjectRef, _user: &UserIdentity) -> Result<(), ServiceError> {
        let mut script = self.script();
        script.discarded.push(project.clone());
        match &script.discard_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
