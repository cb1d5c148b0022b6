//! Execution plan model: parsing, estimation and truncation.
//!
//! Model output is unreliable, so parsing never fails. A response without a
//! usable plan yields [`ParsedPlan::Fallback`], and a malformed review yields
//! [`ReviewDecision::Keep`].

use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::extract::object_fragment;

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Steps kept free for test generation, validation and execution when a plan
/// is truncated.
pub const RESERVED_TAIL_STEPS: u32 = 3;

/// A review is scheduled after every this many completed items.
pub const REVIEW_INTERVAL: usize = 3;

static PLAN_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).expect("plan schema should be JSON");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("plan schema should compile")
});

/// One discrete unit of planned generation work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub components: Vec<String>,
    /// Informational only; items always run in plan order.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl WorkItem {
    pub fn new(title: &str, description: &str, components: &[&str], dependencies: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            components: components.iter().map(|c| c.to_string()).collect(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Ordered sequence of work items. Revisions replace it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionPlan(Vec<WorkItem>);

impl ExecutionPlan {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self(items)
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WorkItem> {
        self.0.get(index)
    }

    /// Return a new plan holding at most the first `len` items.
    pub fn truncated(&self, len: usize) -> Self {
        Self(self.0.iter().take(len).cloned().collect())
    }
}

/// Result of parsing a planning response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPlan {
    /// The response carried a well-formed, non-empty plan.
    Structured(ExecutionPlan),
    /// Nothing usable was found; this is the fixed default plan.
    Fallback(ExecutionPlan),
}

impl ParsedPlan {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ParsedPlan::Fallback(_))
    }

    pub fn into_plan(self) -> ExecutionPlan {
        match self {
            ParsedPlan::Structured(plan) | ParsedPlan::Fallback(plan) => plan,
        }
    }
}

/// Result of parsing a plan-review response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Keep,
    Revise(ExecutionPlan),
}

/// Which optional tail phases will bill a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseFlags {
    pub include_tests: bool,
    pub validate_syntax: bool,
    pub full_execution: bool,
}

#[derive(Debug, Deserialize)]
struct PlanDocument {
    steps: Vec<WorkItem>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RevisedPlan {
    Items(Vec<WorkItem>),
    Document(PlanDocument),
}

#[derive(Debug, Deserialize)]
struct ReviewDocument {
    #[serde(default)]
    needs_modification: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    updated_plan: Option<RevisedPlan>,
}

/// Parse a plan out of free-form model output.
pub fn create_plan(raw: &str) -> ParsedPlan {
    match parse_structured_plan(raw) {
        Some(plan) => ParsedPlan::Structured(plan),
        None => ParsedPlan::Fallback(fallback_plan()),
    }
}

fn parse_structured_plan(raw: &str) -> Option<ExecutionPlan> {
    let Some(fragment) = object_fragment(raw) else {
        debug!("no object fragment in planning response");
        return None;
    };
    let value: Value = match serde_json::from_str(fragment) {
        Ok(value) => value,
        Err(err) => {
            warn!(err = %err, "planning response is not valid JSON, using fallback plan");
            return None;
        }
    };
    if !PLAN_VALIDATOR.is_valid(&value) {
        warn!("planning response does not match the plan schema, using fallback plan");
        return None;
    }
    let document: PlanDocument = match serde_json::from_value(value) {
        Ok(document) => document,
        Err(err) => {
            warn!(err = %err, "failed to decode plan, using fallback plan");
            return None;
        }
    };
    if document.steps.is_empty() {
        warn!("planning response has no steps, using fallback plan");
        return None;
    }
    Some(ExecutionPlan::new(document.steps))
}

/// The fixed three-item plan used when model output has no usable plan.
pub fn fallback_plan() -> ExecutionPlan {
    ExecutionPlan::new(vec![
        WorkItem::new(
            "Primary implementation",
            "Implement the requested functionality",
            &["main_function"],
            &[],
        ),
        WorkItem::new(
            "Error handling",
            "Add error handling and input validation",
            &["error_handling"],
            &["main_function"],
        ),
        WorkItem::new(
            "Documentation",
            "Add docstrings and comments",
            &["docstrings"],
            &["main_function"],
        ),
    ])
}

/// Estimate every step the pipeline would bill for `plan`, planning included.
pub fn estimate_total_steps(plan: &ExecutionPlan, flags: PhaseFlags) -> u32 {
    let items = plan.len() as u32;
    let reviews = if plan.is_empty() {
        0
    } else {
        (plan.len() / REVIEW_INTERVAL).max(1) as u32
    };
    1 + items
        + u32::from(flags.include_tests)
        + u32::from(flags.validate_syntax)
        + u32::from(flags.full_execution)
        + reviews
}

/// Truncate `plan` when its estimate exceeds `ceiling`.
///
/// Keeps at most `ceiling - steps_used - RESERVED_TAIL_STEPS` items (never
/// negative). A plan that already fits is returned unchanged, so applying
/// this twice is the same as applying it once.
pub fn shrink_to_fit(
    plan: ExecutionPlan,
    steps_used: u32,
    ceiling: u32,
    flags: PhaseFlags,
) -> ExecutionPlan {
    let estimate = estimate_total_steps(&plan, flags);
    if estimate <= ceiling {
        return plan;
    }
    let available = ceiling
        .saturating_sub(steps_used)
        .saturating_sub(RESERVED_TAIL_STEPS) as usize;
    if plan.len() <= available {
        return plan;
    }
    warn!(
        estimate,
        ceiling,
        from = plan.len(),
        to = available,
        "plan exceeds step ceiling, truncating"
    );
    plan.truncated(available)
}

/// Parse a plan-review response. Anything unusable means "keep the plan".
pub fn parse_review(raw: &str) -> ReviewDecision {
    let Some(fragment) = object_fragment(raw) else {
        return ReviewDecision::Keep;
    };
    let document: ReviewDocument = match serde_json::from_str(fragment) {
        Ok(document) => document,
        Err(err) => {
            warn!(err = %err, "failed to parse plan review, keeping plan");
            return ReviewDecision::Keep;
        }
    };
    if !document.needs_modification {
        return ReviewDecision::Keep;
    }
    let items = match document.updated_plan {
        Some(RevisedPlan::Items(items)) => items,
        Some(RevisedPlan::Document(doc)) => doc.steps,
        None => Vec::new(),
    };
    if items.is_empty() {
        warn!("plan review asked for changes without a plan, keeping plan");
        return ReviewDecision::Keep;
    }
    debug!(reason = ?document.reason, items = items.len(), "plan review revised plan");
    ReviewDecision::Revise(ExecutionPlan::new(items))
}
