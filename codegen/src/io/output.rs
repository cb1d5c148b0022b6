//! Result bundle assembly, persistence and publication.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::core::budget::StepBudget;
use crate::core::naming::display_title;
use crate::core::plan::ExecutionPlan;
use crate::core::types::{GenerationResult, Outcome, StepRecord};
use crate::core::vars::Variables;
use crate::io::config::{GeneratorConfig, OutputKeys};
use crate::io::workspace::{ProjectHandle, WorkspaceManager};

/// Step accounting reported with every bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub total_steps: u32,
    pub step_times: Vec<StepRecord>,
    /// Wall-clock seconds divided by steps (0 when nothing ran).
    pub average_step_time: f64,
    pub total_execution_time: f64,
}

/// Everything handed back to the caller for one activation.
///
/// Successful runs carry `generated_*`; failed and step-limited runs carry
/// `partial_*` and an `error` instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultBundle {
    pub success: bool,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_tests: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_tests: Option<String>,
    pub execution_plan: ExecutionPlan,
    pub steps_executed: u32,
    pub max_steps: u32,
    pub steps_remaining: u32,
    pub plan_revisions: u32,
    pub execution_time: f64,
    pub performance_metrics: PerformanceMetrics,
    pub provider: String,
    pub model: String,
    pub timestamp: String,
    pub complexity_level: String,
    pub code_style: String,
    pub execution_mode: String,
    pub include_tests: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<String>,
}

impl ResultBundle {
    /// Primary artifact, complete or partial.
    pub fn code(&self) -> Option<&str> {
        self.generated_code
            .as_deref()
            .or(self.partial_code.as_deref())
    }

    /// Test artifact, complete or partial.
    pub fn tests(&self) -> Option<&str> {
        self.generated_tests
            .as_deref()
            .or(self.partial_tests.as_deref())
    }
}

/// State gathered at the terminal phase.
pub struct RunSummary<'a> {
    pub outcome: &'a Outcome,
    pub artifacts: &'a GenerationResult,
    pub plan: &'a ExecutionPlan,
    pub budget: &'a StepBudget,
    pub plan_revisions: u32,
    pub config: &'a GeneratorConfig,
}

fn non_empty(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}

pub fn assemble(summary: &RunSummary<'_>) -> ResultBundle {
    let config = summary.config;
    let budget = summary.budget;
    let elapsed = budget.elapsed().as_secs_f64();
    let steps = budget.used();
    let average_step_time = if steps == 0 {
        0.0
    } else {
        elapsed / f64::from(steps)
    };
    let artifacts = summary.artifacts;

    let (generated_code, generated_tests, partial_code, partial_tests, error) =
        match summary.outcome {
            Outcome::Completed => (
                Some(artifacts.primary_artifact.clone()),
                non_empty(&artifacts.test_artifact),
                None,
                None,
                None,
            ),
            Outcome::StepLimitExceeded {
                steps_executed,
                max_steps,
            } => (
                None,
                None,
                Some(artifacts.primary_artifact.clone()),
                non_empty(&artifacts.test_artifact),
                Some(format!(
                    "step limit exceeded after {steps_executed} of {max_steps} steps"
                )),
            ),
            Outcome::Failed { message, .. } => (
                None,
                None,
                Some(artifacts.primary_artifact.clone()),
                non_empty(&artifacts.test_artifact),
                Some(message.clone()),
            ),
        };

    ResultBundle {
        success: summary.outcome.is_success(),
        outcome: summary.outcome.label().to_string(),
        error,
        generated_code,
        generated_tests,
        partial_code,
        partial_tests,
        execution_plan: summary.plan.clone(),
        steps_executed: steps,
        max_steps: budget.ceiling(),
        steps_remaining: budget.remaining(),
        plan_revisions: summary.plan_revisions,
        execution_time: elapsed,
        performance_metrics: PerformanceMetrics {
            total_steps: steps,
            step_times: budget.records().to_vec(),
            average_step_time,
            total_execution_time: elapsed,
        },
        provider: config.service.provider.as_str().to_string(),
        model: config.service.model.clone(),
        timestamp: Utc::now().to_rfc3339(),
        complexity_level: config.complexity_level.clone(),
        code_style: config.code_style.clone(),
        execution_mode: config.execution_mode.as_str().to_string(),
        include_tests: config.include_tests,
        workspace_path: None,
    }
}

/// Write the bundle's artifacts into the project directory.
///
/// Individual write failures are logged and counted but never change the
/// bundle's outcome. Returns the project path, or `None` when the tree was
/// removed because a failed run could not be persisted and
/// `cleanup_on_error` is set.
pub fn persist(
    workspace: &WorkspaceManager,
    handle: &ProjectHandle,
    bundle: &ResultBundle,
    config: &GeneratorConfig,
) -> Option<PathBuf> {
    let name = &handle.name;
    let write = |filename: &str, subfolder: &str, content: &str| -> bool {
        let path = workspace.safe_path(handle, filename, Some(subfolder));
        match workspace.write(&path, content) {
            Ok(()) => true,
            Err(err) => {
                warn!(err = %format!("{err:#}"), file = filename, "failed to persist artifact");
                false
            }
        }
    };
    let mut failures = 0usize;

    if let Some(code) = bundle.code().filter(|c| !c.trim().is_empty()) {
        let content = format!("{}{}\n", source_header(name, bundle, config), code.trim_end());
        if !write(&format!("{name}.py"), "src", &content) {
            failures += 1;
        }
    }
    if let Some(tests) = bundle.tests().filter(|t| !t.trim().is_empty()) {
        let content = format!("{}{}\n", source_header(name, bundle, config), tests.trim_end());
        if !write(&format!("test_{name}.py"), "tests", &content) {
            failures += 1;
        }
    }
    let documents = [
        (
            "execution_plan.json",
            "docs",
            serde_json::to_string_pretty(&bundle.execution_plan),
        ),
        (
            "project_metadata.json",
            "config",
            serde_json::to_string_pretty(&metadata(name, bundle, config)),
        ),
    ];
    for (filename, subfolder, rendered) in documents {
        match rendered {
            Ok(text) => {
                if !write(filename, subfolder, &(text + "\n")) {
                    failures += 1;
                }
            }
            Err(err) => {
                warn!(err = %err, file = filename, "failed to serialize document");
                failures += 1;
            }
        }
    }
    if !write("README.md", "", &readme(name, bundle, config)) {
        failures += 1;
    }

    if failures > 0 && !bundle.success && config.cleanup_on_error {
        warn!(failures, "persisting a failed run failed, removing project");
        if let Err(err) = workspace.cleanup(handle) {
            warn!(err = %format!("{err:#}"), "failed to remove project");
        }
        return None;
    }
    info!(path = %handle.root_path.display(), failures, "artifacts persisted");
    Some(handle.root_path.clone())
}

fn source_header(name: &str, bundle: &ResultBundle, config: &GeneratorConfig) -> String {
    let description = config.prompt.trim().replace("\"\"\"", "'''");
    format!(
        "\"\"\"\n{title}\n\n{description}\n\nGenerated by codegen ({provider}/{model}) at {timestamp}\nOutcome: {outcome} ({steps}/{max} steps)\n\"\"\"\n\n",
        title = display_title(name),
        provider = bundle.provider,
        model = bundle.model,
        timestamp = bundle.timestamp,
        outcome = bundle.outcome,
        steps = bundle.steps_executed,
        max = bundle.max_steps,
    )
}

fn readme(name: &str, bundle: &ResultBundle, config: &GeneratorConfig) -> String {
    let mut buf = format!("# {}\n\n{}\n\n## Run\n\n", display_title(name), config.prompt.trim());
    buf.push_str(&format!("- Outcome: {}\n", bundle.outcome));
    if let Some(error) = &bundle.error {
        buf.push_str(&format!("- Error: {error}\n"));
    }
    buf.push_str(&format!(
        "- Steps: {} of {}\n- Plan revisions: {}\n- Duration: {:.2}s\n- Backend: {} / {}\n- Generated: {}\n",
        bundle.steps_executed,
        bundle.max_steps,
        bundle.plan_revisions,
        bundle.execution_time,
        bundle.provider,
        bundle.model,
        bundle.timestamp,
    ));
    buf.push_str("\n## Plan\n\n");
    for (i, item) in bundle.execution_plan.items().iter().enumerate() {
        buf.push_str(&format!("{}. **{}**", i + 1, item.title));
        if !item.description.is_empty() {
            buf.push_str(&format!(": {}", item.description));
        }
        buf.push('\n');
    }
    buf.push_str(&format!(
        "\n## Files\n\n- `src/{name}.py`\n- `tests/test_{name}.py`\n- `docs/execution_plan.json`\n- `config/project_metadata.json`\n"
    ));
    buf
}

fn metadata(name: &str, bundle: &ResultBundle, config: &GeneratorConfig) -> Value {
    json!({
        "project_name": name,
        "created_at": bundle.timestamp,
        "prompt": config.prompt,
        "success": bundle.success,
        "outcome": bundle.outcome,
        "error": bundle.error,
        "provider": bundle.provider,
        "model": bundle.model,
        "steps_executed": bundle.steps_executed,
        "max_steps": bundle.max_steps,
        "plan_revisions": bundle.plan_revisions,
        "execution_time": bundle.execution_time,
        "settings": {
            "execution_mode": bundle.execution_mode,
            "complexity_level": bundle.complexity_level,
            "code_style": bundle.code_style,
            "include_tests": bundle.include_tests,
            "validate_syntax": config.validate_syntax,
            "include_documentation": config.include_documentation,
        },
    })
}

/// Write the bundle and its parts into `variables` under `keys`.
///
/// Empty keys and empty values are skipped.
pub fn publish(variables: &mut Variables, keys: &OutputKeys, bundle: &ResultBundle) {
    let mut put = |key: &str, value: Value| {
        if !key.is_empty() {
            variables.insert(key.to_string(), value);
        }
    };
    match serde_json::to_value(bundle) {
        Ok(value) => put(&keys.bundle, value),
        Err(err) => warn!(err = %err, "failed to serialize result bundle"),
    }
    if let Some(code) = bundle.code().filter(|c| !c.is_empty()) {
        put(&keys.code, Value::String(code.to_string()));
    }
    if let Some(tests) = bundle.tests().filter(|t| !t.is_empty()) {
        put(&keys.tests, Value::String(tests.to_string()));
    }
    if !bundle.execution_plan.is_empty() {
        match serde_json::to_value(&bundle.execution_plan) {
            Ok(plan) => put(&keys.plan, plan),
            Err(err) => warn!(err = %err, "failed to serialize plan"),
        }
    }
    if let Some(path) = &bundle.workspace_path {
        put(&keys.workspace_path, Value::String(path.clone()));
    }
}
