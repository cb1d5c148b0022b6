//! Test doubles and deterministic fixtures.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use serde_json::json;

use crate::core::plan::{ExecutionPlan, WorkItem};
use crate::io::config::GeneratorConfig;
use crate::io::sandbox::{Sandbox, SandboxOutcome};
use crate::io::service::{GenerativeService, ServiceError};

/// Service that replays a fixed queue of replies and records every request.
///
/// An exhausted queue answers with a `ServiceError`.
#[derive(Debug, Default)]
pub struct ScriptedService {
    responses: RefCell<VecDeque<Result<String, ServiceError>>>,
    requests: RefCell<Vec<(String, String)>>,
}

impl ScriptedService {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<String, ServiceError>>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// All replies succeed.
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|reply| Ok(reply.into())))
    }

    /// `(instruction, context)` pairs in call order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl GenerativeService for ScriptedService {
    fn send(&self, instruction: &str, context: &str) -> Result<String, ServiceError> {
        self.requests
            .borrow_mut()
            .push((instruction.to_string(), context.to_string()));
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::new("scripted service has no more replies")))
    }
}

/// Sandbox that records what it was asked to run.
#[derive(Debug)]
pub struct RecordingSandbox {
    outcome: Option<SandboxOutcome>,
    runs: Cell<usize>,
    last_code: RefCell<Option<String>>,
}

impl RecordingSandbox {
    pub fn passing() -> Self {
        Self::with(Some(SandboxOutcome::Pass {
            stdout: String::new(),
        }))
    }

    /// Runs, but the script exits non-zero.
    pub fn failing() -> Self {
        Self::with(Some(SandboxOutcome::Fail {
            reason: "exit status Some(1): Traceback".to_string(),
        }))
    }

    /// The sandbox itself cannot start.
    pub fn broken() -> Self {
        Self::with(None)
    }

    fn with(outcome: Option<SandboxOutcome>) -> Self {
        Self {
            outcome,
            runs: Cell::new(0),
            last_code: RefCell::new(None),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.get()
    }

    pub fn last_code(&self) -> Option<String> {
        self.last_code.borrow().clone()
    }
}

impl Sandbox for RecordingSandbox {
    fn run(&self, code: &str) -> Result<SandboxOutcome> {
        self.runs.set(self.runs.get() + 1);
        *self.last_code.borrow_mut() = Some(code.to_string());
        self.outcome
            .clone()
            .ok_or_else(|| anyhow!("interpreter not available"))
    }
}

fn item(index: usize) -> WorkItem {
    let previous = format!("Item {}", index.saturating_sub(1));
    let dependencies: Vec<&str> = if index > 1 {
        vec![previous.as_str()]
    } else {
        Vec::new()
    };
    WorkItem::new(
        &format!("Item {index}"),
        &format!("Implement item {index}"),
        &[&format!("component_{index}")],
        &dependencies,
    )
}

/// A plan of `n` items titled `Item 1..=n`.
pub fn plan_of(n: usize) -> ExecutionPlan {
    ExecutionPlan::new((1..=n).map(item).collect())
}

/// Planner reply whose plan decodes to `plan_of(n)`.
pub fn plan_response(n: usize) -> String {
    json!({ "steps": plan_of(n) }).to_string()
}

/// Wrap `body` in a python code fence.
pub fn code_response(body: &str) -> String {
    format!("```python\n{body}\n```")
}

/// Valid config with the workspace disabled.
pub fn test_config(prompt: &str) -> GeneratorConfig {
    GeneratorConfig {
        prompt: prompt.to_string(),
        workspace_enabled: false,
        ..GeneratorConfig::default()
    }
}
