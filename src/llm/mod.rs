//! Embedding and generation backend.
//!
//! The interpreter needs exactly two operations from a language model:
//! `embed(text)` and `generate(prompt, schema)`. [`LanguageModel`] is that
//! seam; [`OllamaClient`] implements it against a local Ollama server and
//! [`ScriptedModel`] implements it offline for tests and dry runs.

pub mod scripted;

use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::ErrorCategory;

pub use scripted::ScriptedModel;

/// Errors from the model backend.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("Ollama is not available at {url}")]
    #[diagnostic(
        code(interp::llm::unavailable),
        help("Start Ollama with `ollama serve`, check `base_url`, or run with --offline.")
    )]
    Unavailable { url: String },

    #[error("model request failed: {message}")]
    #[diagnostic(
        code(interp::llm::request_failed),
        help("Check that Ollama is running and the models are pulled.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse Ollama response: {message}")]
    #[diagnostic(
        code(interp::llm::parse_error),
        help("The server returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("Ollama request timed out after {timeout_secs}s")]
    #[diagnostic(
        code(interp::llm::timeout),
        help("Increase `timeout_secs` in the [ollama] section or use a smaller model.")
    )]
    Timeout { timeout_secs: u64 },

    #[error("failed to pull model \"{model}\": {message}")]
    #[diagnostic(
        code(interp::llm::model_pull),
        help("Check your internet connection or manually run: ollama pull {model}")
    )]
    ModelPull { model: String, message: String },
}

impl LlmError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ParseError { .. } => ErrorCategory::MalformedResponse,
            Self::Unavailable { .. }
            | Self::RequestFailed { .. }
            | Self::Timeout { .. }
            | Self::ModelPull { .. } => ErrorCategory::Connectivity,
        }
    }
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// The two backend operations the interpreter is built on.
///
/// Calls are blocking; the interpreter runs them off the caller's loop.
pub trait LanguageModel: Send + Sync {
    /// Fixed-length embedding of `text`.
    fn embed(&self, text: &str) -> LlmResult<Vec<f32>>;

    /// Complete `prompt`. With `format`, the answer must be JSON matching
    /// that JSON Schema.
    fn generate(&self, prompt: &str, format: Option<&Value>) -> LlmResult<String>;
}

// ── Ollama ──────────────────────────────────────────────────────────────

/// Configuration for the Ollama client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_generate_model")]
    pub generate_model: String,
    /// Bound on every request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_seed")]
    pub seed: i64,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_embed_model() -> String {
    "all-minilm".into()
}
fn default_generate_model() -> String {
    "qwen2.5-coder".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_seed() -> i64 {
    42
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            embed_model: default_embed_model(),
            generate_model: default_generate_model(),
            timeout_secs: default_timeout_secs(),
            temperature: 0.0,
            seed: default_seed(),
        }
    }
}

/// Client for the Ollama REST API.
pub struct OllamaClient {
    config: OllamaConfig,
    agent: ureq::Agent,
    /// Models available locally after `probe()`.
    available_models: Vec<String>,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            config,
            agent,
            available_models: Vec::new(),
        }
    }

    /// Create a client and fail unless the server answers.
    pub fn connect(config: OllamaConfig) -> LlmResult<Self> {
        let mut client = Self::new(config);
        if !client.probe() {
            return Err(LlmError::Unavailable {
                url: client.config.base_url.clone(),
            });
        }
        Ok(client)
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Check availability via `/api/tags` and refresh the local model list.
    pub fn probe(&mut self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();

        let resp = match agent.get(&url).call() {
            Ok(resp) if resp.status() == 200 => resp,
            _ => {
                self.available_models.clear();
                return false;
            }
        };

        self.available_models = resp
            .into_json::<Value>()
            .ok()
            .and_then(|json| {
                json["models"].as_array().map(|arr| {
                    arr.iter()
                        .filter_map(|m| m["name"].as_str().map(str::to_string))
                        .collect()
                })
            })
            .unwrap_or_default();
        tracing::debug!(models = ?self.available_models, "ollama reachable");
        true
    }

    /// Whether `model` (with or without a `:tag`) is available locally.
    pub fn has_model(&self, model: &str) -> bool {
        self.available_models
            .iter()
            .any(|m| m == model || m.split(':').next() == Some(model))
    }

    /// Pull the embedding and generation models if they are missing.
    pub fn ensure_models(&mut self) -> LlmResult<()> {
        let wanted = [
            self.config.embed_model.clone(),
            self.config.generate_model.clone(),
        ];
        for model in wanted {
            if self.has_model(&model) {
                continue;
            }
            tracing::info!(%model, "pulling model, this may take a few minutes");
            let url = format!("{}/api/pull", self.config.base_url);
            let agent = ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(600))
                .build();
            let resp = agent
                .post(&url)
                .send_json(serde_json::json!({ "name": model, "stream": false }))
                .map_err(|e| LlmError::ModelPull {
                    model: model.clone(),
                    message: e.to_string(),
                })?;
            if resp.status() != 200 {
                return Err(LlmError::ModelPull {
                    model,
                    message: format!("server returned status {}", resp.status()),
                });
            }
        }
        self.probe();
        Ok(())
    }

    fn post(&self, endpoint: &str, body: Value) -> LlmResult<Value> {
        let url = format!("{}/api/{endpoint}", self.config.base_url);
        let resp = self
            .agent
            .post(&url)
            .send_json(body)
            .map_err(|e| self.request_error(e))?;
        resp.into_json::<Value>().map_err(|e| {
            if is_timeout(&e) {
                LlmError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                }
            } else {
                LlmError::ParseError {
                    message: e.to_string(),
                }
            }
        })
    }

    fn request_error(&self, err: ureq::Error) -> LlmError {
        match err {
            ureq::Error::Status(code, resp) => LlmError::RequestFailed {
                message: format!(
                    "server returned status {code}: {}",
                    resp.into_string().unwrap_or_default()
                ),
            },
            ureq::Error::Transport(t) => {
                let timed_out = std::error::Error::source(&t)
                    .and_then(|s| s.downcast_ref::<std::io::Error>())
                    .is_some_and(is_timeout);
                if timed_out {
                    LlmError::Timeout {
                        timeout_secs: self.config.timeout_secs,
                    }
                } else if matches!(
                    t.kind(),
                    ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::Dns
                ) {
                    LlmError::Unavailable {
                        url: self.config.base_url.clone(),
                    }
                } else {
                    LlmError::RequestFailed {
                        message: t.to_string(),
                    }
                }
            }
        }
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

impl LanguageModel for OllamaClient {
    fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        let json = self.post(
            "embed",
            serde_json::json!({ "model": self.config.embed_model, "input": text }),
        )?;
        let vector = json["embeddings"][0]
            .as_array()
            .ok_or_else(|| LlmError::ParseError {
                message: "missing 'embeddings' field".into(),
            })?;
        vector
            .iter()
            .map(|x| {
                x.as_f64().map(|f| f as f32).ok_or_else(|| LlmError::ParseError {
                    message: format!("non-numeric embedding component {x}"),
                })
            })
            .collect()
    }

    fn generate(&self, prompt: &str, format: Option<&Value>) -> LlmResult<String> {
        let mut body = serde_json::json!({
            "model": self.config.generate_model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.config.temperature,
                "seed": self.config.seed,
            },
        });
        if let Some(schema) = format {
            body["format"] = schema.clone();
        }

        let json = self.post("generate", body)?;
        json["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::ParseError {
                message: "missing 'response' field".into(),
            })
    }
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.config.base_url)
            .field("embed_model", &self.config.embed_model)
            .field("generate_model", &self.config.generate_model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable() -> OllamaConfig {
        OllamaConfig {
            base_url: "http://127.0.0.1:1".into(),
            timeout_secs: 2,
            ..Default::default()
        }
    }

    #[test]
    fn probe_unreachable_returns_false() {
        let mut client = OllamaClient::new(unreachable());
        assert!(!client.probe());
        assert!(!client.has_model("all-minilm"));
    }

    #[test]
    fn connect_to_unreachable_server_fails() {
        let err = OllamaClient::connect(unreachable()).unwrap_err();
        assert!(matches!(err, LlmError::Unavailable { .. }));
        assert_eq!(err.category(), ErrorCategory::Connectivity);
    }

    #[test]
    fn calls_to_unreachable_server_are_connectivity_errors() {
        let client = OllamaClient::new(unreachable());
        let err = client.embed("hello").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Connectivity);
        let err = client.generate("hello", None).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Connectivity);
    }

    #[test]
    fn default_config_values() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.embed_model, "all-minilm");
        assert_eq!(config.generate_model, "qwen2.5-coder");
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.seed, 42);
    }
}
