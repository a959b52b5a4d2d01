//! Step navigation for the Upload → Analyze → Transform → Export workflow

pub mod gate;

pub use gate::{InvalidStep, StepGate, StepState, WorkflowStep};
