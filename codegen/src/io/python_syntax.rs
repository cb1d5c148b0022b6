//! Full Python syntax check through the interpreter's own parser.

use std::process::Command;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::core::syntax::{SyntaxError, SyntaxValidator, TreeSitterValidator, snippet_at};
use crate::io::config::SandboxConfig;
use crate::io::process::run_command_with_timeout;

/// Reads the source on stdin; prints `line<TAB>column<TAB>message` and exits
/// with [`REJECTED_EXIT_CODE`] when `ast.parse` refuses it.
const CHECK_SCRIPT: &str = r#"import ast, sys
source = sys.stdin.buffer.read()
try:
    ast.parse(source, filename=sys.argv[1])
except (SyntaxError, ValueError) as exc:
    line = getattr(exc, "lineno", None) or 0
    column = getattr(exc, "offset", None) or 0
    message = getattr(exc, "msg", None) or str(exc)
    sys.stdout.write("%d\t%d\t%s\n" % (line, column, message))
    sys.exit(3)
"#;

const REJECTED_EXIT_CODE: i32 = 3;
const OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Validates Python 3 source the way CPython does.
///
/// Runs [`TreeSitterValidator`] first so obviously broken input never costs a
/// child process, then hands the source to `ast.parse` in the configured
/// interpreter. An interpreter that cannot be started or times out is
/// [`SyntaxError::Parser`].
#[derive(Debug, Clone)]
pub struct PythonSyntaxValidator {
    interpreter: String,
    args: Vec<String>,
    timeout: Duration,
}

impl PythonSyntaxValidator {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Default for PythonSyntaxValidator {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

impl SyntaxValidator for PythonSyntaxValidator {
    #[instrument(skip_all, fields(label = %label, interpreter = %self.interpreter))]
    fn validate(&self, label: &str, source: &str) -> Result<(), SyntaxError> {
        TreeSitterValidator.validate(label, source)?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.args).arg("-c").arg(CHECK_SCRIPT).arg(label);
        let output = run_command_with_timeout(
            cmd,
            Some(source.as_bytes()),
            self.timeout,
            OUTPUT_LIMIT_BYTES,
        )
        .map_err(|err| SyntaxError::Parser(format!("run {}: {err:#}", self.interpreter)))?;

        if output.timed_out {
            return Err(SyntaxError::Parser(format!(
                "{} timed out after {:?}",
                self.interpreter, self.timeout
            )));
        }
        match output.status.code() {
            Some(0) => {
                debug!(bytes = source.len(), "interpreter accepted source");
                Ok(())
            }
            Some(REJECTED_EXIT_CODE) => Err(rejection(label, source, &output.stdout_text())),
            code => Err(SyntaxError::Parser(format!(
                "{} exited with {code:?}: {}",
                self.interpreter,
                output.stderr_tail(400)
            ))),
        }
    }
}

fn rejection(label: &str, source: &str, report: &str) -> SyntaxError {
    let mut fields = report.lines().next().unwrap_or_default().splitn(3, '\t');
    let line: usize = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
    let column: usize = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
    let reason = fields
        .next()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("invalid syntax");
    SyntaxError::Invalid {
        label: label.to_string(),
        line: line.max(1),
        column: column.max(1),
        reason: reason.to_string(),
        snippet: snippet_at(source, line.saturating_sub(1)),
    }
}
