//! Budgeted plan → generate → review → test → validate → execute state machine.
//!
//! [`Pipeline::run`] drives one activation from `PlanCreation` to a terminal
//! phase. The budget is checked before every phase body, so the number of
//! recorded steps never exceeds `max_steps`. Every path ends in a
//! [`RunReport`]; failures are folded into [`Outcome`] instead of returned.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, error, info, instrument, warn};

use crate::agents::coder::CoderAgent;
use crate::agents::planner::PlannerAgent;
use crate::core::budget::StepBudget;
use crate::core::naming::{derive_project_name, sanitize_project_name};
use crate::core::plan::{
    ExecutionPlan, REVIEW_INTERVAL, RESERVED_TAIL_STEPS, ReviewDecision, shrink_to_fit,
};
use crate::core::syntax::{SyntaxError, SyntaxValidator};
use crate::core::types::{FailureKind, GenerationResult, Outcome, Phase, StepKind};
use crate::core::vars::Variables;
use crate::io::config::{ExecutionMode, GeneratorConfig};
use crate::io::output::{ResultBundle, RunSummary, assemble, persist, publish};
use crate::io::prompt::{PlanPrompt, PromptEngine};
use crate::io::sandbox::{Sandbox, SandboxOutcome};
use crate::io::service::{GenerativeService, ServiceError};
use crate::io::workspace::{ProjectHandle, WorkspaceManager, WorkspaceSettings};

/// Result of one activation.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: Outcome,
    /// `Completion` on success, `Error` otherwise (including step limit).
    pub final_phase: Phase,
    pub bundle: ResultBundle,
    pub workspace_path: Option<PathBuf>,
}

/// Mutable state of one activation.
struct RunState {
    phase: Phase,
    budget: StepBudget,
    plan: ExecutionPlan,
    /// Index of the next plan item to generate.
    next_item: usize,
    artifacts: GenerationResult,
    plan_revisions: u32,
    project: Option<ProjectHandle>,
}

/// Collaborators for one activation. Nothing is shared across runs.
pub struct Pipeline<'a, S: ?Sized, V: ?Sized, X: ?Sized> {
    service: &'a S,
    validator: &'a V,
    sandbox: &'a X,
    prompts: PromptEngine,
}

impl<'a, S, V, X> Pipeline<'a, S, V, X>
where
    S: GenerativeService + ?Sized,
    V: SyntaxValidator + ?Sized,
    X: Sandbox + ?Sized,
{
    pub fn new(service: &'a S, validator: &'a V, sandbox: &'a X) -> Self {
        Self {
            service,
            validator,
            sandbox,
            prompts: PromptEngine::new(),
        }
    }

    /// Run to a terminal phase, persist what was produced and publish the
    /// result into `variables`.
    #[instrument(skip_all, fields(max_steps = config.max_steps, mode = config.execution_mode.as_str()))]
    pub fn run(&self, config: &GeneratorConfig, variables: &mut Variables) -> RunReport {
        let config = config.resolve(variables);
        let mut state = RunState {
            phase: Phase::PlanCreation,
            budget: StepBudget::new(config.max_steps),
            plan: ExecutionPlan::default(),
            next_item: 0,
            artifacts: GenerationResult::default(),
            plan_revisions: 0,
            project: None,
        };

        if let Err(err) = config.validate() {
            error!(err = %err, "invalid generator configuration");
            state.phase = Phase::Error;
            let outcome = Outcome::Failed {
                kind: FailureKind::InvalidConfig,
                message: err.to_string(),
            };
            return self.finish(&config, state, outcome, None, variables);
        }

        let workspace = config
            .workspace_enabled
            .then(|| WorkspaceManager::new(WorkspaceSettings::from_config(&config)));
        info!("generation started");

        let outcome = loop {
            if state.phase == Phase::Completion {
                break Outcome::Completed;
            }
            if !state.budget.has_room() {
                warn!(
                    phase = state.phase.as_str(),
                    steps = state.budget.used(),
                    "step limit reached"
                );
                let steps_executed = state.budget.used();
                state.phase = Phase::Error;
                break Outcome::StepLimitExceeded {
                    steps_executed,
                    max_steps: config.max_steps,
                };
            }
            let from = state.phase;
            match self.advance(&config, &mut state, workspace.as_ref()) {
                Ok(next) => {
                    debug!(from = from.as_str(), to = next.as_str(), "phase transition");
                    state.phase = next;
                }
                Err(err) => {
                    let kind = classify(&err);
                    error!(phase = from.as_str(), ?kind, err = %format!("{err:#}"), "phase failed");
                    state.phase = Phase::Error;
                    break Outcome::Failed {
                        kind,
                        message: format!("{err:#}"),
                    };
                }
            }
        };

        info!(
            outcome = outcome.label(),
            steps = state.budget.used(),
            revisions = state.plan_revisions,
            "generation finished"
        );
        self.finish(&config, state, outcome, workspace.as_ref(), variables)
    }

    fn advance(
        &self,
        config: &GeneratorConfig,
        state: &mut RunState,
        workspace: Option<&WorkspaceManager>,
    ) -> Result<Phase> {
        match state.phase {
            Phase::PlanCreation => self.create_plan(config, state, workspace),
            Phase::StepExecution => self.generate_item(config, state),
            Phase::PlanReview => self.review_plan(config, state),
            Phase::TestGeneration => self.generate_tests(config, state),
            Phase::CodeValidation => self.validate(config, state),
            Phase::Execution => self.execute(state),
            Phase::Completion | Phase::Error => Ok(state.phase),
        }
    }

    fn create_plan(
        &self,
        config: &GeneratorConfig,
        state: &mut RunState,
        workspace: Option<&WorkspaceManager>,
    ) -> Result<Phase> {
        if let Some(workspace) = workspace {
            match workspace.initialize(config.project_name.as_deref(), &config.prompt) {
                Ok(handle) => state.project = Some(handle),
                Err(err) => warn!(
                    err = %format!("{err:#}"),
                    "workspace unavailable, continuing without persistence"
                ),
            }
        }

        let steps_before = state.budget.used();
        state.budget.record_step(StepKind::Planning)?;
        let max_items = config
            .max_steps
            .saturating_sub(steps_before + 1 + RESERVED_TAIL_STEPS)
            .max(1);
        let parsed = PlannerAgent::new(&self.prompts).create(
            self.service,
            &PlanPrompt {
                prompt: &config.prompt,
                complexity_level: &config.complexity_level,
                code_style: &config.code_style,
                include_tests: config.include_tests,
                max_items,
            },
        )?;
        state.plan = shrink_to_fit(
            parsed.into_plan(),
            steps_before,
            config.max_steps,
            config.phase_flags(),
        );
        info!(items = state.plan.len(), "plan created");

        if config.execution_mode == ExecutionMode::PlanOnly {
            return Ok(Phase::Completion);
        }
        Ok(next_generation_phase(config, state))
    }

    fn generate_item(&self, config: &GeneratorConfig, state: &mut RunState) -> Result<Phase> {
        let Some(item) = state.plan.get(state.next_item).cloned() else {
            return Ok(after_generation(config));
        };
        state.budget.record_step(StepKind::Generation)?;
        let index = state.next_item + 1;
        let coder = CoderAgent::new(
            &self.prompts,
            &config.code_style,
            config.include_documentation,
        );
        let code = coder.generate_item(
            self.service,
            index,
            state.plan.len(),
            &item,
            &state.artifacts.primary_artifact,
        )?;

        let primary = &mut state.artifacts.primary_artifact;
        primary.push_str(&format!("\n# Step {index}: {}\n", item.title));
        primary.push_str(&code);
        primary.push('\n');
        state.next_item += 1;
        info!(item = index, total = state.plan.len(), title = %item.title, "item generated");

        if state.next_item < state.plan.len() && state.next_item % REVIEW_INTERVAL == 0 {
            return Ok(Phase::PlanReview);
        }
        Ok(next_generation_phase(config, state))
    }

    fn review_plan(&self, config: &GeneratorConfig, state: &mut RunState) -> Result<Phase> {
        state.budget.record_step(StepKind::Review)?;
        let decision = PlannerAgent::new(&self.prompts).review(
            self.service,
            &state.plan,
            state.next_item,
            state.budget.remaining(),
        )?;
        if let ReviewDecision::Revise(revised) = decision {
            info!(from = state.plan.len(), to = revised.len(), "plan revised");
            state.plan = revised;
            state.plan_revisions += 1;
        }
        Ok(next_generation_phase(config, state))
    }

    fn generate_tests(&self, config: &GeneratorConfig, state: &mut RunState) -> Result<Phase> {
        state.budget.record_step(StepKind::TestGeneration)?;
        let module = module_name(config, state.project.as_ref());
        let coder = CoderAgent::new(
            &self.prompts,
            &config.code_style,
            config.include_documentation,
        );
        match coder.generate_tests(self.service, &module, &state.artifacts.primary_artifact) {
            Ok(tests) => {
                info!(bytes = tests.len(), "tests generated");
                state.artifacts.test_artifact = tests;
            }
            Err(err) => warn!(err = %format!("{err:#}"), "test generation failed, continuing without tests"),
        }
        Ok(Phase::CodeValidation)
    }

    fn validate(&self, config: &GeneratorConfig, state: &mut RunState) -> Result<Phase> {
        if !config.validate_syntax {
            return Ok(Phase::Execution);
        }
        state.budget.record_step(StepKind::Validation)?;
        self.validator
            .validate("code", &state.artifacts.primary_artifact)?;
        if !state.artifacts.test_artifact.trim().is_empty() {
            self.validator
                .validate("tests", &state.artifacts.test_artifact)?;
        }
        info!("syntax validation passed");
        if config.execution_mode == ExecutionMode::Full {
            Ok(Phase::Execution)
        } else {
            Ok(Phase::Completion)
        }
    }

    fn execute(&self, state: &mut RunState) -> Result<Phase> {
        state.budget.record_step(StepKind::Execution)?;
        match self.sandbox.run(&state.artifacts.primary_artifact) {
            Ok(SandboxOutcome::Pass { stdout }) => {
                info!(stdout_bytes = stdout.len(), "generated code ran successfully");
            }
            Ok(SandboxOutcome::Fail { reason }) => {
                warn!(%reason, "generated code failed to run");
            }
            Ok(SandboxOutcome::Skipped) => debug!("execution skipped by sandbox"),
            Err(err) => warn!(err = %format!("{err:#}"), "sandbox unavailable"),
        }
        Ok(Phase::Completion)
    }

    fn finish(
        &self,
        config: &GeneratorConfig,
        state: RunState,
        outcome: Outcome,
        workspace: Option<&WorkspaceManager>,
        variables: &mut Variables,
    ) -> RunReport {
        let mut bundle = assemble(&RunSummary {
            outcome: &outcome,
            artifacts: &state.artifacts,
            plan: &state.plan,
            budget: &state.budget,
            plan_revisions: state.plan_revisions,
            config,
        });
        let workspace_path = match (workspace, state.project.as_ref()) {
            (Some(workspace), Some(handle)) => persist(workspace, handle, &bundle, config),
            _ => None,
        };
        bundle.workspace_path = workspace_path
            .as_ref()
            .map(|path| path.display().to_string());
        publish(variables, &config.outputs, &bundle);

        RunReport {
            outcome,
            final_phase: state.phase,
            bundle,
            workspace_path,
        }
    }
}

/// Where to go once the current item is done (or when there are none left).
fn next_generation_phase(config: &GeneratorConfig, state: &RunState) -> Phase {
    if state.next_item < state.plan.len() {
        Phase::StepExecution
    } else {
        after_generation(config)
    }
}

fn after_generation(config: &GeneratorConfig) -> Phase {
    if config.include_tests {
        Phase::TestGeneration
    } else {
        Phase::CodeValidation
    }
}

fn module_name(config: &GeneratorConfig, project: Option<&ProjectHandle>) -> String {
    if let Some(project) = project {
        return project.name.clone();
    }
    match config.project_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => sanitize_project_name(name),
        _ => derive_project_name(&config.prompt),
    }
}

fn classify(err: &anyhow::Error) -> FailureKind {
    if err.downcast_ref::<ServiceError>().is_some() {
        FailureKind::Service
    } else if err.downcast_ref::<SyntaxError>().is_some() {
        FailureKind::Syntax
    } else {
        FailureKind::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::python_syntax::PythonSyntaxValidator;
    use crate::io::sandbox::NoopSandbox;
    use crate::test_support::{ScriptedService, code_response, plan_response, test_config};

    #[test]
    fn classify_recognizes_typed_errors() {
        let service: anyhow::Error = ServiceError::new("down").into();
        assert_eq!(classify(&service), FailureKind::Service);
        let syntax: anyhow::Error = SyntaxError::Parser("x".to_string()).into();
        assert_eq!(classify(&syntax.context("validate code")), FailureKind::Syntax);
        assert_eq!(classify(&anyhow::anyhow!("other")), FailureKind::Internal);
    }

    #[test]
    fn module_name_prefers_project_name() {
        let mut config = test_config("Create a weather dashboard");
        assert_eq!(module_name(&config, None), "weather_dashboard");
        config.project_name = Some("my tool".to_string());
        assert_eq!(module_name(&config, None), "my_tool");
    }

    #[test]
    fn invalid_config_spends_no_steps() {
        let service = ScriptedService::default();
        let validator = PythonSyntaxValidator::default();
        let pipeline = Pipeline::new(&service, &validator, &NoopSandbox);
        let mut config = test_config("x");
        config.max_steps = 3;
        let mut vars = Variables::new();

        let report = pipeline.run(&config, &mut vars);
        assert!(matches!(
            report.outcome,
            Outcome::Failed {
                kind: FailureKind::InvalidConfig,
                ..
            }
        ));
        assert_eq!(report.final_phase, Phase::Error);
        assert_eq!(report.bundle.steps_executed, 0);
        assert_eq!(service.calls(), 0);
        assert!(vars.contains_key("generation_result"));
    }

    #[test]
    fn generate_only_skips_execution() {
        let service = ScriptedService::replies([
            plan_response(1),
            code_response("def main():\n    return 1"),
        ]);
        let validator = PythonSyntaxValidator::default();
        let pipeline = Pipeline::new(&service, &validator, &NoopSandbox);
        let mut config = test_config("Build a counter");
        config.include_tests = false;
        config.execution_mode = ExecutionMode::GenerateOnly;
        let mut vars = Variables::new();

        let report = pipeline.run(&config, &mut vars);
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.final_phase, Phase::Completion);
        // plan, item, validation
        assert_eq!(report.bundle.steps_executed, 3);
        assert!(
            report
                .bundle
                .generated_code
                .as_deref()
                .is_some_and(|code| code.contains("\n# Step 1: Item 1\ndef main():"))
        );
    }
}
