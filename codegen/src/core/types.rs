//! Shared deterministic types for the pipeline.
//!
//! These types define stable contracts between the state machine, the budget
//! tracker and the output assembler. They must not depend on external state.

use serde::{Deserialize, Serialize};

/// Internal phase of the generation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PlanCreation,
    StepExecution,
    PlanReview,
    TestGeneration,
    CodeValidation,
    Execution,
    Completion,
    Error,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::PlanCreation => "plan_creation",
            Phase::StepExecution => "step_execution",
            Phase::PlanReview => "plan_review",
            Phase::TestGeneration => "test_generation",
            Phase::CodeValidation => "code_validation",
            Phase::Execution => "execution",
            Phase::Completion => "completion",
            Phase::Error => "error",
        }
    }
}

/// Kind of billable work recorded against the step ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    #[serde(rename = "plan_creation")]
    Planning,
    #[serde(rename = "code_generation")]
    Generation,
    #[serde(rename = "plan_revision")]
    Review,
    #[serde(rename = "test_generation")]
    TestGeneration,
    #[serde(rename = "code_validation")]
    Validation,
    #[serde(rename = "code_execution")]
    Execution,
}

/// One recorded unit of work. Append-only; used for reporting, never replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-indexed position of this step within the activation.
    pub index: u32,
    pub kind: StepKind,
    /// Seconds since the activation started when the step was recorded.
    pub elapsed_seconds: f64,
}

/// Artifacts accumulated while the pipeline runs.
///
/// Both buffers only grow during `StepExecution`/`TestGeneration`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResult {
    pub primary_artifact: String,
    pub test_artifact: String,
}

/// Classification of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Configuration rejected before any step was spent.
    InvalidConfig,
    /// The generative backend failed during a fatal phase.
    Service,
    /// Generated code (or tests) did not parse.
    Syntax,
    /// Anything else (template rendering, budget bookkeeping).
    Internal,
}

/// Structured result of one activation. The pipeline never panics or returns
/// `Err`; every path ends in one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    StepLimitExceeded { steps_executed: u32, max_steps: u32 },
    Failed { kind: FailureKind, message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::StepLimitExceeded { .. } => "step_limit_exceeded",
            Outcome::Failed { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_kinds_serialize_with_stable_names() {
        let json = serde_json::to_string(&StepKind::Review).expect("serialize");
        assert_eq!(json, "\"plan_revision\"");
        let json = serde_json::to_string(&StepKind::Generation).expect("serialize");
        assert_eq!(json, "\"code_generation\"");
    }
}
