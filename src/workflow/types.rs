use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Text recorded on a failed conversion that arrived without an explanation.
pub const UNSPECIFIED_CONVERSION_ERROR: &str = "conversion failed";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("phase plan contains no phases")]
    Empty,
    #[error("phase at position {position} is numbered {found}, expected {expected}")]
    NonContiguous {
        position: usize,
        expected: u32,
        found: u32,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("phase {found} recorded out of order, expected phase {expected}")]
    OutOfOrder { expected: u32, found: u32 },
}

/// One externally computed unit of transformation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub number: u32,
    pub name: String,
    #[serde(default)]
    pub file_list: Vec<String>,
}

/// Ordered phases produced by the analysis step. Treated as immutable input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePlan {
    pub phases: Vec<Phase>,
}

impl PhasePlan {
    pub fn new(phases: Vec<Phase>) -> Self {
        Self { phases }
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn total_phases(&self) -> u32 {
        self.phases.len() as u32
    }

    /// Phases must be numbered 1..=N in order.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.phases.is_empty() {
            return Err(PlanError::Empty);
        }
        for (position, phase) in self.phases.iter().enumerate() {
            let expected = position as u32 + 1;
            if phase.number != expected {
                return Err(PlanError::NonContiguous {
                    position,
                    expected,
                    found: phase.number,
                });
            }
        }
        Ok(())
    }

    pub fn phase(&self, number: u32) -> Option<&Phase> {
        number
            .checked_sub(1)
            .and_then(|index| self.phases.get(index as usize))
    }
}

/// Outcome of converting a single source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOutcome {
    pub source_file: String,
    #[serde(default)]
    pub target_file: String,
    #[serde(default)]
    pub source_code: String,
    #[serde(default)]
    pub converted_code: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConversionOutcome {
    pub fn failed(source_file: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            source_file: source_file.into(),
            target_file: String::new(),
            source_code: String::new(),
            converted_code: String::new(),
            dependencies: Vec::new(),
            success: false,
            error: Some(if error.is_empty() {
                UNSPECIFIED_CONVERSION_ERROR.to_string()
            } else {
                error
            }),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    /// A failure carries a message; a success carries converted code.
    pub fn is_consistent(&self) -> bool {
        if self.success {
            !self.converted_code.is_empty()
        } else {
            self.error_message().is_some()
        }
    }
}

/// Result of one executed (or synthesized failed) phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseResult {
    pub phase_number: u32,
    pub phase_name: String,
    #[serde(default)]
    pub files_converted: u32,
    #[serde(default)]
    pub conversions: Vec<ConversionOutcome>,
}

impl PhaseResult {
    /// Stand-in for a phase whose remote call failed. Keeps the result
    /// list contiguous without inventing output.
    pub fn failed(phase: &Phase, error: impl Into<String>) -> Self {
        Self {
            phase_number: phase.number,
            phase_name: phase.name.clone(),
            files_converted: 0,
            conversions: vec![ConversionOutcome::failed(phase.name.clone(), error)],
        }
    }

    pub fn has_failures(&self) -> bool {
        self.conversions.iter().any(|c| !c.success)
    }

    pub fn successful_conversions(&self) -> usize {
        self.conversions.iter().filter(|c| c.success).count()
    }
}

/// Opaque output of the analysis step, cached alongside the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult(pub serde_json::Value);

/// Accumulated state of a transformation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowProgress {
    pub phase_results: Vec<PhaseResult>,
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
}

impl WorkflowProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.phase_results.is_empty()
    }

    pub fn completed_phases(&self) -> u32 {
        self.phase_results.len() as u32
    }

    pub fn next_phase_number(&self) -> u32 {
        self.completed_phases() + 1
    }

    /// Append the next phase's result and fold its dependencies in.
    pub fn record(&mut self, result: PhaseResult) -> Result<(), ProgressError> {
        let expected = self.next_phase_number();
        if result.phase_number != expected {
            return Err(ProgressError::OutOfOrder {
                expected,
                found: result.phase_number,
            });
        }
        for conversion in &result.conversions {
            self.merge_dependencies(&conversion.dependencies);
        }
        self.phase_results.push(result);
        Ok(())
    }

    /// Set union; merging the same list twice is a no-op.
    pub fn merge_dependencies<'a>(&mut self, dependencies: impl IntoIterator<Item = &'a String>) {
        for dependency in dependencies {
            let dependency = dependency.trim();
            if !dependency.is_empty() && !self.dependencies.contains(dependency) {
                self.dependencies.insert(dependency.to_string());
            }
        }
    }

    /// `phase_results[i].phase_number == i + 1` for every entry.
    pub fn is_contiguous(&self) -> bool {
        self.phase_results
            .iter()
            .enumerate()
            .all(|(i, r)| r.phase_number == i as u32 + 1)
    }

    /// Whether this progress can be resumed against `plan`.
    pub fn fits_plan(&self, plan: &PhasePlan) -> bool {
        self.phase_results.len() <= plan.len() && self.is_contiguous()
    }

    pub fn is_complete_for(&self, plan: &PhasePlan) -> bool {
        !plan.is_empty() && self.phase_results.len() == plan.len()
    }

    pub fn total_files(&self) -> u64 {
        self.phase_results.iter().map(|r| r.files_converted as u64).sum()
    }

    pub fn successful_conversions(&self) -> u64 {
        self.phase_results
            .iter()
            .map(|r| r.successful_conversions() as u64)
            .sum()
    }

    /// `round(100 * successful / total_files)`, 0 when nothing was converted.
    pub fn success_rate(&self) -> u32 {
        let total = self.total_files();
        if total == 0 {
            return 0;
        }
        (100.0 * self.successful_conversions() as f64 / total as f64).round() as u32
    }

    pub fn failed_phase_numbers(&self) -> Vec<u32> {
        self.phase_results
            .iter()
            .filter(|r| r.has_failures())
            .map(|r| r.phase_number)
            .collect()
    }

    pub fn summary(&self, total_phases: u32) -> MigrationSummary {
        MigrationSummary {
            total_phases,
            completed_phases: self.completed_phases(),
            failed_phases: self.failed_phase_numbers(),
            total_files: self.total_files(),
            success_rate: self.success_rate(),
            dependencies: self.dependencies.iter().cloned().collect(),
        }
    }
}

/// Figures derived purely from the recorded phase results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    pub total_phases: u32,
    pub completed_phases: u32,
    pub failed_phases: Vec<u32>,
    pub total_files: u64,
    pub success_rate: u32,
    pub dependencies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(number: u32) -> Phase {
        Phase {
            number,
            name: format!("phase-{number}"),
            file_list: vec![format!("src/file{number}.js")],
        }
    }

    fn converted(file: &str, deps: &[&str]) -> ConversionOutcome {
        ConversionOutcome {
            source_file: file.to_string(),
            target_file: file.replace(".js", ".ts"),
            source_code: "var a = 1;".to_string(),
            converted_code: "const a: number = 1;".to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            success: true,
            error: None,
        }
    }

    fn result(number: u32, conversions: Vec<ConversionOutcome>) -> PhaseResult {
        PhaseResult {
            phase_number: number,
            phase_name: format!("phase-{number}"),
            files_converted: conversions.len() as u32,
            conversions,
        }
    }

    #[test]
    fn test_plan_validation() {
        assert_eq!(PhasePlan::default().validate(), Err(PlanError::Empty));
        assert!(PhasePlan::new(vec![phase(1), phase(2)]).validate().is_ok());
        assert_eq!(
            PhasePlan::new(vec![phase(1), phase(3)]).validate(),
            Err(PlanError::NonContiguous {
                position: 1,
                expected: 2,
                found: 3
            })
        );
        let plan = PhasePlan::new(vec![phase(1), phase(2)]);
        assert_eq!(plan.phase(2).map(|p| p.name.as_str()), Some("phase-2"));
        assert!(plan.phase(0).is_none());
        assert!(plan.phase(3).is_none());
    }

    #[test]
    fn test_failed_phase_result_carries_error() {
        let failed = PhaseResult::failed(&phase(2), "");
        assert_eq!(failed.phase_number, 2);
        assert_eq!(failed.files_converted, 0);
        assert!(failed.has_failures());
        assert!(failed.conversions[0].is_consistent());
        assert_eq!(
            failed.conversions[0].error_message(),
            Some(UNSPECIFIED_CONVERSION_ERROR)
        );
    }

    #[test]
    fn test_record_rejects_out_of_order_results() {
        let mut progress = WorkflowProgress::new();
        progress.record(result(1, vec![])).unwrap();
        assert_eq!(
            progress.record(result(3, vec![])),
            Err(ProgressError::OutOfOrder {
                expected: 2,
                found: 3
            })
        );
        assert_eq!(progress.completed_phases(), 1);
    }

    #[test]
    fn test_dependency_merge_is_idempotent() {
        let mut progress = WorkflowProgress::new();
        let deps = vec!["react".to_string(), "lodash".to_string(), "react".to_string()];
        progress.merge_dependencies(&deps);
        progress.merge_dependencies(&deps);
        assert_eq!(
            progress.dependencies.iter().cloned().collect::<Vec<_>>(),
            vec!["lodash".to_string(), "react".to_string()]
        );
    }

    #[test]
    fn test_record_unions_dependencies_across_phases() {
        let mut progress = WorkflowProgress::new();
        progress
            .record(result(1, vec![converted("a.js", &["react", "axios"])]))
            .unwrap();
        progress
            .record(result(2, vec![converted("b.js", &["react", "zod"])]))
            .unwrap();
        assert_eq!(progress.dependencies.len(), 3);
    }

    #[test]
    fn test_success_rate_with_no_files_is_zero() {
        let mut progress = WorkflowProgress::new();
        assert_eq!(progress.success_rate(), 0);
        progress.record(PhaseResult::failed(&phase(1), "timeout")).unwrap();
        assert_eq!(progress.total_files(), 0);
        assert_eq!(progress.success_rate(), 0);
    }

    #[test]
    fn test_success_rate_rounds() {
        let mut progress = WorkflowProgress::new();
        let mut failed = ConversionOutcome::failed("c.js", "syntax error");
        failed.target_file = "c.ts".to_string();
        progress
            .record(result(
                1,
                vec![converted("a.js", &[]), converted("b.js", &[]), failed],
            ))
            .unwrap();
        assert_eq!(progress.total_files(), 3);
        assert_eq!(progress.success_rate(), 67);
        assert_eq!(progress.failed_phase_numbers(), vec![1]);
    }

    #[test]
    fn test_progress_wire_format_is_camel_case() {
        let mut progress = WorkflowProgress::new();
        progress.record(result(1, vec![converted("a.js", &["x"])])).unwrap();
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["phaseResults"][0]["phaseNumber"], 1);
        assert_eq!(json["phaseResults"][0]["filesConverted"], 1);
        assert_eq!(json["phaseResults"][0]["conversions"][0]["convertedCode"], "const a: number = 1;");
        assert_eq!(json["dependencies"][0], "x");
    }

    #[test]
    fn test_fits_plan() {
        let plan = PhasePlan::new(vec![phase(1)]);
        let mut progress = WorkflowProgress::new();
        assert!(progress.fits_plan(&plan));
        progress.record(result(1, vec![])).unwrap();
        assert!(progress.fits_plan(&plan));
        assert!(progress.is_complete_for(&plan));

        progress.phase_results.push(result(2, vec![]));
        assert!(!progress.fits_plan(&plan));
    }
}
