//! Generator configuration (TOML).

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::budget::MIN_STEP_CEILING;
use crate::core::plan::PhaseFlags;
use crate::core::vars::{Variables, format_placeholders};

/// Configuration rejected before any step was spent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required option 'prompt'")]
    MissingPrompt,
    #[error("max_steps must be at least {min} (got {got})")]
    MaxStepsTooLow { got: u32, min: u32 },
    #[error("invalid execution_mode '{0}' (expected plan_only, generate_only or full)")]
    InvalidExecutionMode(String),
    #[error("unsupported provider '{0}' (expected openai, anthropic, ollama or command)")]
    UnsupportedProvider(String),
    #[error("service.command must be a non-empty array when provider is 'command'")]
    MissingCommand,
    #[error("sandbox.interpreter must not be empty")]
    MissingInterpreter,
    #[error("{0} must be > 0")]
    NotPositive(&'static str),
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// How far the pipeline goes after planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ExecutionMode {
    /// Stop once the plan exists.
    PlanOnly,
    /// Generate and validate, but never run the result.
    GenerateOnly,
    /// Generate, validate and run the result in the sandbox.
    #[default]
    Full,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::PlanOnly => "plan_only",
            ExecutionMode::GenerateOnly => "generate_only",
            ExecutionMode::Full => "full",
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "plan_only" => Ok(ExecutionMode::PlanOnly),
            "generate_only" => Ok(ExecutionMode::GenerateOnly),
            "full" => Ok(ExecutionMode::Full),
            other => Err(ConfigError::InvalidExecutionMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for ExecutionMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Generative backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Provider {
    #[default]
    OpenAi,
    Anthropic,
    Ollama,
    /// Any CLI that reads a prompt on stdin and prints the completion.
    Command,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Ollama => "ollama",
            Provider::Command => "command",
        }
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "ollama" => Ok(Provider::Ollama),
            "command" => Ok(Provider::Command),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Generative service settings (`[service]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub provider: Provider,
    pub model: String,
    /// May reference workflow variables, e.g. `"{openai_key}"`.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound for a single request.
    pub timeout_secs: u64,
    /// Program and arguments for `provider = "command"`.
    pub command: Vec<String>,
    /// Truncate command stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            model: "gpt-3.5-turbo".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.3,
            max_tokens: 4096,
            timeout_secs: 120,
            command: Vec::new(),
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Sandboxed execution settings (`[sandbox]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    pub interpreter: String,
    /// Passed before the script path; `-I` isolates from user site-packages.
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            args: vec!["-I".to_string()],
            timeout_secs: 30,
            output_limit_bytes: 100_000,
        }
    }
}

/// Variable names the result is published under (`[outputs]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputKeys {
    pub bundle: String,
    pub code: String,
    pub tests: String,
    pub plan: String,
    pub workspace_path: String,
}

impl Default for OutputKeys {
    fn default() -> Self {
        Self {
            bundle: "generation_result".to_string(),
            code: "generated_code".to_string(),
            tests: "generated_tests".to_string(),
            plan: "execution_plan".to_string(),
            workspace_path: "workspace_path".to_string(),
        }
    }
}

/// Generator configuration.
///
/// Missing fields default to the values below; only `prompt` is required.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// What to build. May reference workflow variables as `{name}`.
    pub prompt: String,
    /// Hard ceiling on billable steps (minimum 5).
    pub max_steps: u32,
    pub execution_mode: ExecutionMode,
    pub include_tests: bool,
    pub validate_syntax: bool,
    pub include_documentation: bool,
    pub complexity_level: String,
    pub code_style: String,

    pub workspace_enabled: bool,
    pub workspace_root: PathBuf,
    pub project_name: Option<String>,
    /// Suffix project folders with `_%Y%m%d_%H%M%S`.
    pub timestamp_folders: bool,
    /// Create `src/`, `tests/`, `docs/` and `config/` inside the project.
    pub project_subfolders: bool,
    /// Remove the project tree when a failed run could not be persisted.
    pub cleanup_on_error: bool,

    pub service: ServiceConfig,
    pub sandbox: SandboxConfig,
    pub outputs: OutputKeys,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            max_steps: 20,
            execution_mode: ExecutionMode::Full,
            include_tests: true,
            validate_syntax: true,
            include_documentation: true,
            complexity_level: "medium".to_string(),
            code_style: "pep8".to_string(),
            workspace_enabled: true,
            workspace_root: PathBuf::from("workspace"),
            project_name: None,
            timestamp_folders: true,
            project_subfolders: true,
            cleanup_on_error: false,
            service: ServiceConfig::default(),
            sandbox: SandboxConfig::default(),
            outputs: OutputKeys::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt.trim().is_empty() {
            return Err(ConfigError::MissingPrompt);
        }
        if self.max_steps < MIN_STEP_CEILING {
            return Err(ConfigError::MaxStepsTooLow {
                got: self.max_steps,
                min: MIN_STEP_CEILING,
            });
        }
        if self.service.provider == Provider::Command
            && self
                .service
                .command
                .first()
                .is_none_or(|program| program.trim().is_empty())
        {
            return Err(ConfigError::MissingCommand);
        }
        if self.service.timeout_secs == 0 {
            return Err(ConfigError::NotPositive("service.timeout_secs"));
        }
        if self.service.output_limit_bytes == 0 {
            return Err(ConfigError::NotPositive("service.output_limit_bytes"));
        }
        if self.sandbox.interpreter.trim().is_empty() {
            return Err(ConfigError::MissingInterpreter);
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(ConfigError::NotPositive("sandbox.timeout_secs"));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(ConfigError::NotPositive("sandbox.output_limit_bytes"));
        }
        Ok(())
    }

    /// Return a copy with `{name}` placeholders resolved against `variables`.
    ///
    /// Only free-text fields are formatted: the prompt, the project name and
    /// the service credentials/endpoint.
    pub fn resolve(&self, variables: &Variables) -> GeneratorConfig {
        let mut resolved = self.clone();
        resolved.prompt = format_placeholders(&self.prompt, variables);
        resolved.project_name = self
            .project_name
            .as_deref()
            .map(|name| format_placeholders(name, variables));
        resolved.service.api_key = self
            .service
            .api_key
            .as_deref()
            .map(|key| format_placeholders(key, variables));
        resolved.service.base_url = self
            .service
            .base_url
            .as_deref()
            .map(|url| format_placeholders(url, variables));
        resolved
    }

    pub fn phase_flags(&self) -> PhaseFlags {
        PhaseFlags {
            include_tests: self.include_tests,
            validate_syntax: self.validate_syntax,
            full_execution: self.execution_mode == ExecutionMode::Full,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GeneratorConfig::default()`. Validation is
/// left to the caller because CLI flags may still fill in the prompt.
pub fn load_config(path: &Path) -> Result<GeneratorConfig> {
    if !path.exists() {
        return Ok(GeneratorConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GeneratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &GeneratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> GeneratorConfig {
        GeneratorConfig {
            prompt: "Build a CSV parser".to_string(),
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, GeneratorConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("codegen.toml");
        let cfg = GeneratorConfig {
            project_name: Some("parser".to_string()),
            ..valid()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg: GeneratorConfig = toml::from_str(
            r#"
prompt = "Build {thing}"
max_steps = 8
execution_mode = "generate_only"

[service]
provider = "ollama"
model = "llama3"
"#,
        )
        .expect("parse");
        assert_eq!(cfg.max_steps, 8);
        assert_eq!(cfg.execution_mode, ExecutionMode::GenerateOnly);
        assert_eq!(cfg.service.provider, Provider::Ollama);
        assert_eq!(cfg.service.timeout_secs, 120);
        assert!(cfg.include_tests);
        assert_eq!(cfg.outputs.code, "generated_code");
    }

    #[test]
    fn unknown_execution_mode_is_rejected() {
        let err = toml::from_str::<GeneratorConfig>("prompt = \"x\"\nexecution_mode = \"fast\"\n")
            .expect_err("unknown mode");
        assert!(err.to_string().contains("invalid execution_mode 'fast'"), "{err}");
        assert_eq!(
            "fast".parse::<ExecutionMode>(),
            Err(ConfigError::InvalidExecutionMode("fast".to_string()))
        );
    }

    #[test]
    fn provider_names_go_through_from_str() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("codegen.toml");
        fs::write(&path, "prompt = \"x\"\n[service]\nprovider = \"gemini\"\n").expect("write");
        let err = load_config(&path).expect_err("unknown provider");
        assert!(
            format!("{err:#}").contains("unsupported provider 'gemini'"),
            "{err:#}"
        );

        fs::write(&path, "prompt = \"x\"\n[service]\nprovider = \"Anthropic\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.service.provider, Provider::Anthropic);
        let written = toml::to_string(&cfg).expect("serialize");
        assert!(written.contains("provider = \"anthropic\""), "{written}");
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert_eq!(
            GeneratorConfig::default().validate(),
            Err(ConfigError::MissingPrompt)
        );
        let low = GeneratorConfig {
            max_steps: 4,
            ..valid()
        };
        assert_eq!(
            low.validate(),
            Err(ConfigError::MaxStepsTooLow { got: 4, min: 5 })
        );
        let mut command = valid();
        command.service.provider = Provider::Command;
        assert_eq!(command.validate(), Err(ConfigError::MissingCommand));
        command.service.command = vec!["llm".to_string()];
        assert_eq!(command.validate(), Ok(()));
    }

    #[test]
    fn resolve_formats_free_text_fields() {
        let mut cfg = valid();
        cfg.prompt = "Build a {kind} parser".to_string();
        cfg.project_name = Some("{kind}_tool".to_string());
        cfg.service.api_key = Some("{key}".to_string());
        let mut vars = Variables::new();
        vars.insert("kind".to_string(), json!("csv"));
        vars.insert("key".to_string(), json!("sk-test"));

        let resolved = cfg.resolve(&vars);
        assert_eq!(resolved.prompt, "Build a csv parser");
        assert_eq!(resolved.project_name.as_deref(), Some("csv_tool"));
        assert_eq!(resolved.service.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.prompt, "Build a {kind} parser");
    }

    #[test]
    fn phase_flags_follow_mode() {
        let mut cfg = valid();
        assert!(cfg.phase_flags().full_execution);
        cfg.execution_mode = ExecutionMode::GenerateOnly;
        assert!(!cfg.phase_flags().full_execution);
    }
}
