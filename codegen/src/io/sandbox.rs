//! Sandboxed execution of generated code.

use std::fs;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::io::config::SandboxConfig;
use crate::io::process::run_command_with_timeout;

const SCRIPT_NAME: &str = "main.py";

/// Result of running an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxOutcome {
    Pass { stdout: String },
    Fail { reason: String },
    Skipped,
}

/// Runs a primary artifact in isolation.
///
/// `Err` is reserved for infrastructure problems (no interpreter, no temp
/// dir); a script that runs and fails is `Ok(SandboxOutcome::Fail)`.
pub trait Sandbox {
    fn run(&self, code: &str) -> Result<SandboxOutcome>;
}

impl<T: Sandbox + ?Sized> Sandbox for Box<T> {
    fn run(&self, code: &str) -> Result<SandboxOutcome> {
        (**self).run(code)
    }
}

/// Runs the script with a local interpreter inside a throwaway directory.
#[derive(Debug, Clone)]
pub struct InterpreterSandbox {
    interpreter: String,
    args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl InterpreterSandbox {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl Sandbox for InterpreterSandbox {
    #[instrument(skip_all, fields(interpreter = %self.interpreter))]
    fn run(&self, code: &str) -> Result<SandboxOutcome> {
        let dir = tempfile::tempdir().context("create sandbox dir")?;
        let script = dir.path().join(SCRIPT_NAME);
        fs::write(&script, code).with_context(|| format!("write {}", script.display()))?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.args)
            .arg(SCRIPT_NAME)
            .current_dir(dir.path())
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default());
        debug!(bytes = code.len(), "running artifact");

        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run {}", self.interpreter))?;

        if output.timed_out {
            return Ok(SandboxOutcome::Fail {
                reason: format!("timed out after {:?}", self.timeout),
            });
        }
        if !output.status.success() {
            return Ok(SandboxOutcome::Fail {
                reason: format!(
                    "exit status {:?}: {}",
                    output.status.code(),
                    output.stderr_tail(400)
                ),
            });
        }
        info!("artifact ran successfully");
        Ok(SandboxOutcome::Pass {
            stdout: output.stdout_text(),
        })
    }
}

/// Never runs anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSandbox;

impl Sandbox for NoopSandbox {
    fn run(&self, _code: &str) -> Result<SandboxOutcome> {
        Ok(SandboxOutcome::Skipped)
    }
}
