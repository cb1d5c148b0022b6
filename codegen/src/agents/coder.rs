//! Coder agent: per-item code generation and test generation.

use anyhow::{Result, bail};
use tracing::debug;

use crate::core::extract::extract_code;
use crate::core::plan::WorkItem;
use crate::io::prompt::PromptEngine;
use crate::io::service::GenerativeService;

pub struct CoderAgent<'a> {
    prompts: &'a PromptEngine,
    code_style: &'a str,
    include_documentation: bool,
}

impl<'a> CoderAgent<'a> {
    pub fn new(prompts: &'a PromptEngine, code_style: &'a str, include_documentation: bool) -> Self {
        Self {
            prompts,
            code_style,
            include_documentation,
        }
    }

    /// Generate code for one plan item, with `existing` as context.
    ///
    /// `index` is 1-based.
    pub fn generate_item<S: GenerativeService + ?Sized>(
        &self,
        service: &S,
        index: usize,
        total: usize,
        item: &WorkItem,
        existing: &str,
    ) -> Result<String> {
        let instruction = self.prompts.render_step(
            index,
            total,
            item,
            self.code_style,
            self.include_documentation,
        )?;
        let raw = service.send(&instruction, existing)?;
        let code = extract_code(&raw);
        debug!(index, bytes = code.len(), "generated item code");
        Ok(code)
    }

    /// Generate unit tests for `code`, importable as `module_name`.
    pub fn generate_tests<S: GenerativeService + ?Sized>(
        &self,
        service: &S,
        module_name: &str,
        code: &str,
    ) -> Result<String> {
        let instruction = self.prompts.render_tests(module_name, self.code_style)?;
        let raw = service.send(&instruction, code)?;
        let tests = extract_code(&raw);
        if tests.trim().is_empty() {
            bail!("test generation returned no code");
        }
        Ok(tests)
    }
}
