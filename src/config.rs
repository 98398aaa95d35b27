//! TOML configuration for the `bdi-chat` binary.
//!
//! ```toml
//! [ollama]
//! base_url = "http://localhost:11434"
//! generate_model = "qwen2.5-coder"
//!
//! [interpreter]
//! name = "interpreter"
//! forces = ["tell", "achieve", "askOne"]
//!
//! [[agents]]
//! name = "bob"
//! source = "agents/bob.asl"
//! ```
//!
//! Every section is optional. Relative agent paths resolve against the
//! directory holding the configuration file.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interpreter::InterpreterConfig;
use crate::knowledge::{AgentKnowledge, KnowledgeError};
use crate::llm::OllamaConfig;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(interp::config::read),
        help("Check that the file passed with --config exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(code(interp::config::parse), help("{message}"))]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(interp::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Agent(#[from] KnowledgeError),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// An agent whose knowledge is read from an AgentSpeak file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub name: String,
    pub source: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
}

impl Settings {
    pub fn from_toml_str(src: &str, origin: &str) -> ConfigResult<Self> {
        toml::from_str(src).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut settings = Self::from_toml_str(&content, &path.display().to_string())?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for agent in &mut settings.agents {
            if agent.source.is_relative() {
                agent.source = base.join(&agent.source);
            }
        }
        tracing::debug!(path = %path.display(), agents = settings.agents.len(), "loaded config");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.display().to_string(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Parse every configured agent source, in order.
    pub fn load_agents(&self) -> ConfigResult<Vec<(String, AgentKnowledge)>> {
        self.agents
            .iter()
            .map(|entry| {
                let knowledge = AgentKnowledge::load(&entry.source)?;
                Ok((entry.name.clone(), knowledge))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeSource;
    use crate::message::Force;

    #[test]
    fn empty_config_uses_defaults() {
        let settings = Settings::from_toml_str("", "inline").unwrap();
        assert_eq!(settings.ollama.base_url, "http://localhost:11434");
        assert_eq!(settings.interpreter, InterpreterConfig::default());
        assert!(settings.agents.is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [ollama]
            generate_model = "llama3"

            [interpreter]
            forces = ["tell", "askOne"]
            "#,
            "inline",
        )
        .unwrap();
        assert_eq!(settings.ollama.generate_model, "llama3");
        assert_eq!(settings.ollama.embed_model, "all-minilm");
        assert_eq!(settings.interpreter.forces, vec![Force::Tell, Force::AskOne]);
        assert_eq!(settings.interpreter.name, "interpreter");
    }

    #[test]
    fn bad_force_is_a_parse_error() {
        let err = Settings::from_toml_str("[interpreter]\nforces = [\"promise\"]", "inline")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn agent_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("agents")).unwrap();
        std::fs::write(dir.path().join("agents/bob.asl"), "price(pizza, 12).\n").unwrap();
        let config = dir.path().join("chat.toml");
        std::fs::write(
            &config,
            "[[agents]]\nname = \"bob\"\nsource = \"agents/bob.asl\"\n",
        )
        .unwrap();

        let settings = Settings::load(&config).unwrap();
        assert_eq!(settings.agents[0].source, dir.path().join("agents/bob.asl"));

        let agents = settings.load_agents().unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].0, "bob");
        assert_eq!(agents[0].1.facts().len(), 1);
    }

    #[test]
    fn missing_agent_source_is_reported() {
        let settings = Settings {
            agents: vec![AgentEntry {
                name: "ghost".into(),
                source: PathBuf::from("/nonexistent/ghost.asl"),
            }],
            ..Default::default()
        };
        assert!(matches!(
            settings.load_agents().unwrap_err(),
            ConfigError::Agent(KnowledgeError::Read { .. })
        ));
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/chat.toml");
        let mut settings = Settings::default();
        settings.interpreter.name = "chatbot".into();
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.interpreter.name, "chatbot");
        assert_eq!(loaded.interpreter.prompts, settings.interpreter.prompts);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Settings::load(Path::new("/nonexistent/chat.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
