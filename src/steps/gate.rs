use serde::{Deserialize, Serialize};
use statig::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The four screens of a migration workflow, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum WorkflowStep {
    Upload = 1,
    Analyze = 2,
    Transform = 3,
    Export = 4,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("workflow step must be between 1 and 4, got {0}")]
pub struct InvalidStep(pub u8);

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 4] = [
        WorkflowStep::Upload,
        WorkflowStep::Analyze,
        WorkflowStep::Transform,
        WorkflowStep::Export,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Option<Self> {
        Self::try_from(self.number() + 1).ok()
    }

    pub fn previous(self) -> Option<Self> {
        self.number().checked_sub(1).and_then(|n| Self::try_from(n).ok())
    }

    pub fn name(self) -> &'static str {
        match self {
            WorkflowStep::Upload => "upload",
            WorkflowStep::Analyze => "analyze",
            WorkflowStep::Transform => "transform",
            WorkflowStep::Export => "export",
        }
    }
}

impl From<WorkflowStep> for u8 {
    fn from(step: WorkflowStep) -> Self {
        step.number()
    }
}

impl TryFrom<u8> for WorkflowStep {
    type Error = InvalidStep;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(WorkflowStep::Upload),
            2 => Ok(WorkflowStep::Analyze),
            3 => Ok(WorkflowStep::Transform),
            4 => Ok(WorkflowStep::Export),
            other => Err(InvalidStep(other)),
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

/// Serializable snapshot of the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    pub current_step: WorkflowStep,
    pub completed_steps: BTreeSet<WorkflowStep>,
}

impl StepState {
    /// Start of a workflow: on Upload with Upload reachable.
    pub fn initial() -> Self {
        Self {
            current_step: WorkflowStep::Upload,
            completed_steps: BTreeSet::from([WorkflowStep::Upload]),
        }
    }

    /// The current step is Upload, a completed step, or the one right after
    /// a completed step.
    pub fn is_consistent(&self) -> bool {
        let current = self.current_step;
        current == WorkflowStep::Upload
            || self.completed_steps.contains(&current)
            || current
                .previous()
                .is_some_and(|previous| self.completed_steps.contains(&previous))
    }
}

impl Default for StepState {
    fn default() -> Self {
        Self::initial()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StepEvent {
    GoTo(WorkflowStep),
    Complete(WorkflowStep),
    Reset,
    Restore(WorkflowStep),
}

#[derive(Debug)]
struct GateContext {
    completed: BTreeSet<WorkflowStep>,
    force_refresh: bool,
}

impl GateContext {
    fn new(completed: BTreeSet<WorkflowStep>) -> Self {
        Self {
            completed,
            force_refresh: false,
        }
    }
}

#[state_machine(initial = "State::upload()", state(derive(Debug, Clone, PartialEq, Eq)))]
impl GateContext {
    #[state]
    fn upload(&mut self, event: &StepEvent) -> Outcome<State> {
        self.route(WorkflowStep::Upload, event)
    }

    #[state(entry_action = "enter_analyze", exit_action = "leave_analyze")]
    fn analyze(&mut self, event: &StepEvent) -> Outcome<State> {
        self.route(WorkflowStep::Analyze, event)
    }

    #[action]
    fn enter_analyze(&mut self) {
        self.force_refresh = !self.completed.contains(&WorkflowStep::Analyze);
        debug!(force_refresh = self.force_refresh, "Entered analyze step");
    }

    #[action]
    fn leave_analyze(&mut self) {
        self.force_refresh = false;
    }

    #[state]
    fn transform(&mut self, event: &StepEvent) -> Outcome<State> {
        self.route(WorkflowStep::Transform, event)
    }

    #[state]
    fn export(&mut self, event: &StepEvent) -> Outcome<State> {
        self.route(WorkflowStep::Export, event)
    }
}

impl GateContext {
    fn route(&mut self, current: WorkflowStep, event: &StepEvent) -> Outcome<State> {
        match event {
            StepEvent::GoTo(target) if *target == current => Handled,
            StepEvent::GoTo(target) if self.completed.contains(target) => Transition(state_for(*target)),
            StepEvent::GoTo(target) => {
                debug!(current = %current, target = %target, "Ignoring navigation to locked step");
                Handled
            }
            StepEvent::Complete(step) => {
                self.completed.insert(*step);
                match step.next() {
                    Some(next) => Transition(state_for(next)),
                    None => {
                        info!("Workflow exported, starting a new workflow");
                        self.completed = StepState::initial().completed_steps;
                        Transition(State::upload())
                    }
                }
            }
            StepEvent::Reset => {
                self.completed = StepState::initial().completed_steps;
                Transition(State::upload())
            }
            StepEvent::Restore(target) => Transition(state_for(*target)),
        }
    }
}

fn state_for(step: WorkflowStep) -> State {
    match step {
        WorkflowStep::Upload => State::upload(),
        WorkflowStep::Analyze => State::analyze(),
        WorkflowStep::Transform => State::transform(),
        WorkflowStep::Export => State::export(),
    }
}

/// Controls which workflow step is shown and which are reachable.
///
/// Navigation to a step that is neither current nor completed is ignored.
/// Completing a step unlocks it and moves to the next one; completing
/// Export starts a fresh workflow.
pub struct StepGate {
    machine: StateMachine<GateContext>,
}

impl StepGate {
    pub fn new() -> Self {
        Self {
            machine: GateContext::new(StepState::initial().completed_steps).state_machine(),
        }
    }

    /// Rebuild a gate from a saved snapshot. An inconsistent snapshot falls
    /// back to a fresh workflow.
    pub fn from_state(state: &StepState) -> Self {
        if !state.is_consistent() {
            warn!(current = %state.current_step, "Discarding inconsistent step state");
            return Self::new();
        }

        let mut completed = state.completed_steps.clone();
        completed.insert(WorkflowStep::Upload);
        let mut machine = GateContext::new(completed).state_machine();
        machine.handle(&StepEvent::Restore(state.current_step));
        Self { machine }
    }

    pub fn current_step(&self) -> WorkflowStep {
        match self.machine.state() {
            State::Upload { .. } => WorkflowStep::Upload,
            State::Analyze { .. } => WorkflowStep::Analyze,
            State::Transform { .. } => WorkflowStep::Transform,
            State::Export { .. } => WorkflowStep::Export,
        }
    }

    pub fn completed_steps(&self) -> &BTreeSet<WorkflowStep> {
        &self.machine.inner().completed
    }

    /// Set while on Analyze if the step had never been completed, telling
    /// the analysis collaborator to ignore cached results.
    pub fn force_refresh(&self) -> bool {
        self.machine.inner().force_refresh
    }

    pub fn is_accessible(&self, step: WorkflowStep) -> bool {
        step == self.current_step() || self.completed_steps().contains(&step)
    }

    /// Navigate to `step`. Returns whether the gate is now on it.
    pub fn go_to_step(&mut self, step: WorkflowStep) -> bool {
        self.machine.handle(&StepEvent::GoTo(step));
        self.current_step() == step
    }

    pub fn complete_step(&mut self, step: WorkflowStep) {
        self.machine.handle(&StepEvent::Complete(step));
    }

    pub fn reset(&mut self) {
        self.machine.handle(&StepEvent::Reset);
    }

    pub fn state(&self) -> StepState {
        StepState {
            current_step: self.current_step(),
            completed_steps: self.completed_steps().clone(),
        }
    }
}

impl Default for StepGate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StepGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepGate")
            .field("state", &self.state())
            .field("force_refresh", &self.force_refresh())
            .finish()
    }
}
