//! Generative service abstraction and backends.
//!
//! The pipeline only sees [`GenerativeService`]: an instruction plus the code
//! produced so far goes in, text comes out. Tests script responses through
//! `test_support::ScriptedService` without any network or process.

use std::process::Command;
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::io::config::{ConfigError, Provider, ServiceConfig};
use crate::io::process::run_command_with_timeout;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A generative service call failed or returned nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("generative service error: {message}")]
pub struct ServiceError {
    pub message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Text-in/text-out generative backend.
pub trait GenerativeService {
    /// Send `instruction`, with `context` (the code generated so far, possibly
    /// empty) attached, and return the raw response text.
    fn send(&self, instruction: &str, context: &str) -> Result<String, ServiceError>;
}

impl<T: GenerativeService + ?Sized> GenerativeService for Box<T> {
    fn send(&self, instruction: &str, context: &str) -> Result<String, ServiceError> {
        (**self).send(instruction, context)
    }
}

/// Join an instruction with the existing code it builds on.
pub fn compose_prompt(instruction: &str, context: &str) -> String {
    if context.trim().is_empty() {
        return instruction.to_string();
    }
    format!("{instruction}\n\nEXISTING CODE:\n```python\n{context}\n```\n")
}

/// Build the backend selected by `config.provider`.
pub fn build_service(config: &ServiceConfig) -> Result<Box<dyn GenerativeService>, ConfigError> {
    match config.provider {
        Provider::Command => Ok(Box::new(CommandService::from_config(config)?)),
        Provider::OpenAi | Provider::Anthropic | Provider::Ollama => {
            Ok(Box::new(HttpService::new(config)?))
        }
    }
}

/// Backend that pipes the prompt into an external program's stdin and reads
/// the completion from its stdout.
#[derive(Debug, Clone)]
pub struct CommandService {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandService {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            output_limit_bytes: 1_000_000,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or(ConfigError::MissingCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        })
    }
}

impl GenerativeService for CommandService {
    #[instrument(skip_all, fields(program = %self.program))]
    fn send(&self, instruction: &str, context: &str) -> Result<String, ServiceError> {
        let prompt = compose_prompt(instruction, context);
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|e| ServiceError::new(format!("{}: {e:#}", self.program)))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "service command timed out");
            return Err(ServiceError::new(format!(
                "{} timed out after {:?}",
                self.program, self.timeout
            )));
        }
        if !output.status.success() {
            return Err(ServiceError::new(format!(
                "{} exited with status {:?}: {}",
                self.program,
                output.status.code(),
                output.stderr_tail(400)
            )));
        }
        let text = output.stdout_text();
        if text.trim().is_empty() {
            return Err(ServiceError::new(format!("{} returned no output", self.program)));
        }
        debug!(bytes = text.len(), "service command responded");
        Ok(text)
    }
}

/// Backend for hosted chat/completion HTTP APIs.
pub struct HttpService {
    client: reqwest::blocking::Client,
    provider: Provider,
    model: String,
    api_key: Option<String>,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl HttpService {
    pub fn new(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        let default_base = match config.provider {
            Provider::Anthropic => ANTHROPIC_BASE_URL,
            Provider::Ollama => OLLAMA_BASE_URL,
            Provider::OpenAi | Provider::Command => OPENAI_BASE_URL,
        };
        let base_url = config
            .base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(default_base)
            .trim_end_matches('/')
            .to_string();
        info!(provider = config.provider.as_str(), model = %config.model, %base_url, "http service configured");
        Ok(Self {
            client,
            provider: config.provider,
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            base_url,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn request_body(&self, prompt: &str) -> (String, Value) {
        match self.provider {
            Provider::Anthropic => (
                format!("{}/messages", self.base_url),
                json!({
                    "model": self.model,
                    "max_tokens": self.max_tokens,
                    "temperature": self.temperature,
                    "messages": [{"role": "user", "content": prompt}],
                }),
            ),
            Provider::Ollama => (
                format!("{}/api/generate", self.base_url),
                json!({
                    "model": self.model,
                    "prompt": prompt,
                    "stream": false,
                    "options": {"temperature": self.temperature},
                }),
            ),
            Provider::OpenAi | Provider::Command => (
                format!("{}/chat/completions", self.base_url),
                json!({
                    "model": self.model,
                    "temperature": self.temperature,
                    "max_tokens": self.max_tokens,
                    "messages": [{"role": "user", "content": prompt}],
                }),
            ),
        }
    }
}

impl GenerativeService for HttpService {
    #[instrument(skip_all, fields(provider = self.provider.as_str(), model = %self.model))]
    fn send(&self, instruction: &str, context: &str) -> Result<String, ServiceError> {
        let prompt = compose_prompt(instruction, context);
        let (url, body) = self.request_body(&prompt);

        let mut request = self.client.post(&url).json(&body);
        match (self.provider, self.api_key.as_deref()) {
            (Provider::Anthropic, Some(key)) => {
                request = request
                    .header("x-api-key", key)
                    .header("anthropic-version", ANTHROPIC_VERSION);
            }
            (Provider::Anthropic, None) => {
                request = request.header("anthropic-version", ANTHROPIC_VERSION);
            }
            (_, Some(key)) => request = request.bearer_auth(key),
            (_, None) => {}
        }

        let response = request
            .send()
            .map_err(|e| ServiceError::new(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            let detail: String = detail.chars().take(400).collect();
            return Err(ServiceError::new(format!("{url} returned HTTP {status}: {detail}")));
        }
        let payload: Value = response
            .json()
            .map_err(|e| ServiceError::new(format!("invalid JSON from {url}: {e}")))?;
        let text = extract_completion(self.provider, &payload)?;
        debug!(bytes = text.len(), "http service responded");
        Ok(text)
    }
}

/// Pull the completion text out of a provider response payload.
pub fn extract_completion(provider: Provider, payload: &Value) -> Result<String, ServiceError> {
    let pointer = match provider {
        Provider::Anthropic => "/content/0/text",
        Provider::Ollama => "/response",
        Provider::OpenAi | Provider::Command => "/choices/0/message/content",
    };
    match payload.pointer(pointer).and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        Some(_) => Err(ServiceError::new("service returned an empty completion")),
        None => Err(ServiceError::new(format!(
            "response has no text at {pointer}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_prompt_attaches_existing_code() {
        assert_eq!(compose_prompt("Do it", "  "), "Do it");
        let prompt = compose_prompt("Add tests", "def f():\n    pass");
        assert!(prompt.starts_with("Add tests\n\nEXISTING CODE:\n```python\n"));
        assert!(prompt.contains("def f():"));
    }

    #[test]
    fn extracts_completion_per_provider() {
        let openai = json!({"choices": [{"message": {"content": "print(1)"}}]});
        let anthropic = json!({"content": [{"type": "text", "text": "print(2)"}]});
        let ollama = json!({"response": "print(3)", "done": true});
        assert_eq!(
            extract_completion(Provider::OpenAi, &openai).expect("openai"),
            "print(1)"
        );
        assert_eq!(
            extract_completion(Provider::Anthropic, &anthropic).expect("anthropic"),
            "print(2)"
        );
        assert_eq!(
            extract_completion(Provider::Ollama, &ollama).expect("ollama"),
            "print(3)"
        );
    }

    #[test]
    fn missing_or_empty_completion_is_an_error() {
        assert!(extract_completion(Provider::OpenAi, &json!({"choices": []})).is_err());
        assert!(extract_completion(Provider::Ollama, &json!({"response": " "})).is_err());
    }

    #[test]
    fn build_service_requires_command_for_command_provider() {
        let config = ServiceConfig {
            provider: Provider::Command,
            ..ServiceConfig::default()
        };
        assert!(matches!(
            build_service(&config),
            Err(ConfigError::MissingCommand)
        ));
    }

    #[test]
    fn http_service_uses_provider_default_base_url() {
        let config = ServiceConfig {
            provider: Provider::Ollama,
            ..ServiceConfig::default()
        };
        let service = HttpService::new(&config).expect("client");
        let (url, body) = service.request_body("hi");
        assert_eq!(url, "http://localhost:11434/api/generate");
        assert_eq!(body["stream"], json!(false));
    }

    #[cfg(unix)]
    #[test]
    fn command_service_round_trips_stdin() {
        let service = CommandService::new(
            "sh",
            vec!["-c".to_string(), "cat".to_string()],
            Duration::from_secs(10),
        );
        let out = service.send("Write code", "x = 1").expect("send");
        assert!(out.starts_with("Write code"));
        assert!(out.contains("x = 1"));
    }

    #[cfg(unix)]
    #[test]
    fn command_service_reports_failures() {
        let failing = CommandService::new(
            "sh",
            vec!["-c".to_string(), "echo boom >&2; exit 2".to_string()],
            Duration::from_secs(10),
        );
        let err = failing.send("x", "").expect_err("non-zero exit");
        assert!(err.message.contains("boom"));

        let silent = CommandService::new(
            "sh",
            vec!["-c".to_string(), "cat >/dev/null".to_string()],
            Duration::from_secs(10),
        );
        let err = silent.send("x", "").expect_err("empty output");
        assert!(err.message.contains("no output"));
    }
}
