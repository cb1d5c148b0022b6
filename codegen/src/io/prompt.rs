//! Instruction templates sent to the generative service.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::plan::{ExecutionPlan, WorkItem};

const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const STEP_TEMPLATE: &str = include_str!("prompts/step.md");
const REVIEW_TEMPLATE: &str = include_str!("prompts/review.md");
const TESTS_TEMPLATE: &str = include_str!("prompts/tests.md");

/// Inputs for the planning instruction.
#[derive(Debug, Clone, Copy)]
pub struct PlanPrompt<'a> {
    pub prompt: &'a str,
    pub complexity_level: &'a str,
    pub code_style: &'a str,
    pub include_tests: bool,
    /// Largest plan that can still finish under the step ceiling.
    pub max_items: u32,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("plan", PLAN_TEMPLATE)
            .expect("plan template should be valid");
        env.add_template("step", STEP_TEMPLATE)
            .expect("step template should be valid");
        env.add_template("review", REVIEW_TEMPLATE)
            .expect("review template should be valid");
        env.add_template("tests", TESTS_TEMPLATE)
            .expect("tests template should be valid");
        Self { env }
    }

    pub fn render_plan(&self, input: &PlanPrompt<'_>) -> Result<String> {
        let template = self.env.get_template("plan")?;
        let rendered = template.render(context! {
            prompt => input.prompt.trim(),
            complexity_level => input.complexity_level,
            code_style => input.code_style,
            include_tests => input.include_tests,
            max_items => input.max_items.max(1),
        })?;
        Ok(rendered)
    }

    /// `index` is 1-based.
    pub fn render_step(
        &self,
        index: usize,
        total: usize,
        item: &WorkItem,
        code_style: &str,
        include_documentation: bool,
    ) -> Result<String> {
        let template = self.env.get_template("step")?;
        let rendered = template.render(context! {
            index => index,
            total => total,
            item => item,
            code_style => code_style,
            include_documentation => include_documentation,
        })?;
        Ok(rendered)
    }

    pub fn render_review(
        &self,
        plan: &ExecutionPlan,
        completed: usize,
        steps_remaining: u32,
    ) -> Result<String> {
        let plan_json = serde_json::to_string_pretty(plan).context("serialize plan for review")?;
        let template = self.env.get_template("review")?;
        let rendered = template.render(context! {
            plan_json => plan_json,
            completed => completed,
            total => plan.len(),
            steps_remaining => steps_remaining,
        })?;
        Ok(rendered)
    }

    pub fn render_tests(&self, module_name: &str, code_style: &str) -> Result<String> {
        let template = self.env.get_template("tests")?;
        let rendered = template.render(context! {
            module_name => module_name,
            code_style => code_style,
        })?;
        Ok(rendered)
    }
}
