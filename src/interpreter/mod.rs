//! The semantic interpreter: free-text chat ⇄ agent messages.
//!
//! Outgoing, a sentence goes through
//! `strip mentions → classify force → nearest known term → same-shape
//! examples → schema → slot filling → term`, and the resulting [`Message`] is
//! handed to the runtime's [`Dispatch`]. Incoming, a message is rendered into
//! a prompt and the model's prose comes back.
//!
//! Connectivity and malformed-response failures stop at this boundary and
//! become an [`Outcome::Rejected`] or a fixed notice. Invariant violations
//! propagate as errors.

pub mod prompts;
pub mod service;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InterpError, InterpResult};
use crate::knowledge::KnowledgeSource;
use crate::llm::LanguageModel;
use crate::message::{Content, Dispatch, Force, Message};
use crate::schema::Schema;
use crate::space::{EmbeddingSpace, Subspace};
use crate::term::record::strip_code_fences;
use crate::term::{from_record, parse_record, to_record, Term, Trigger};

pub use prompts::PromptTemplates;
pub use service::{InterpreterService, Pending};

/// Shown in the chat when an incoming message cannot be rendered.
pub const RENDER_FAILURE_NOTICE: &str = "Error showing the message";

// ── Configuration ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// The interpreter's own agent name; beliefs it planted are not indexed.
    #[serde(default = "default_name")]
    pub name: String,
    /// Forces the classifier may answer with.
    #[serde(default = "default_forces")]
    pub forces: Vec<Force>,
    #[serde(default)]
    pub prompts: PromptTemplates,
}

fn default_name() -> String {
    "interpreter".into()
}
fn default_forces() -> Vec<Force> {
    Force::ALL.to_vec()
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            forces: default_forces(),
            prompts: PromptTemplates::default(),
        }
    }
}

// ── Outcome ─────────────────────────────────────────────────────────────

/// What became of an outgoing chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Delivered to every named receiver, or broadcast when none was named.
    Sent {
        receivers: Vec<String>,
        message: Message,
    },
    /// Delivered to the known receivers; `unresolved` named nobody.
    Partial {
        receivers: Vec<String>,
        unresolved: Vec<String>,
        message: Message,
    },
    /// Nothing was sent.
    Rejected { reason: String },
    /// Empty sentence: no message, no backend call.
    Dropped,
}

impl Outcome {
    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Sent { message, .. } | Self::Partial { message, .. } => Some(message),
            Self::Rejected { .. } | Self::Dropped => None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.message().is_some()
    }
}

// ── Mentions ────────────────────────────────────────────────────────────

static MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(\S+)").unwrap());
static MENTION_WITH_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*@\S+").unwrap());
static THINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

/// `@name` receivers in order of appearance, without duplicates. Trailing
/// punctuation (`@bob,`) is not part of the name.
pub fn extract_mentions(line: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in MENTION.captures_iter(line) {
        let name = cap[1].trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '_');
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

pub fn strip_mentions(line: &str) -> String {
    MENTION_WITH_SPACE.replace_all(line, "").trim().to_string()
}

/// Remove `<think>...</think>` blocks some models emit before answering.
pub fn strip_thinking(text: &str) -> String {
    THINK.replace_all(text, "").trim().to_string()
}

// ── Interpreter ─────────────────────────────────────────────────────────

/// Translates between chat lines and agent messages over one embedding space.
pub struct Interpreter {
    config: InterpreterConfig,
    space: EmbeddingSpace,
    dispatch: Arc<dyn Dispatch>,
}

impl Interpreter {
    /// Create an interpreter with an empty index.
    pub fn new(
        config: InterpreterConfig,
        model: Arc<dyn LanguageModel>,
        dispatch: Arc<dyn Dispatch>,
    ) -> Self {
        Self {
            config,
            space: EmbeddingSpace::new(model),
            dispatch,
        }
    }

    /// Sender name on outgoing messages.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// The index built from ingested knowledge.
    pub fn space(&self) -> &EmbeddingSpace {
        &self.space
    }

    fn model(&self) -> &dyn LanguageModel {
        self.space.model().as_ref()
    }

    /// Index everything `agent` knows. Returns the number of newly embedded
    /// terms; re-ingesting unchanged knowledge embeds nothing.
    ///
    /// Rules contribute their head and every predicate of their body, plain
    /// facts themselves. Plans contribute their guard predicates, and their
    /// trigger literal to `plans` (achievement goals) or `terms` (the rest).
    /// Facts the interpreter planted and protocol bookkeeping are skipped.
    pub fn ingest(&self, agent: &str, source: &dyn KnowledgeSource) -> InterpResult<usize> {
        self.space.register_agent(agent);
        let mut added = 0;

        for fact in source.facts() {
            if fact.is_system(self.name()) {
                continue;
            }
            added += usize::from(self.space.add(agent, Subspace::Terms, &fact.head)?);
            if let Some(body) = &fact.body {
                for pred in body.predicates() {
                    added += usize::from(self.space.add(agent, Subspace::Terms, &pred)?);
                }
            }
        }

        for plan in source.plans() {
            if plan.is_system() {
                continue;
            }
            if let Some(context) = &plan.context {
                for pred in context.predicates() {
                    added += usize::from(self.space.add(agent, Subspace::Terms, &pred)?);
                }
            }
            let subspace = if plan.trigger.is_achievement_goal() {
                Subspace::Plans
            } else {
                Subspace::Terms
            };
            added += usize::from(self.space.add(agent, subspace, &plan.trigger.literal)?);
        }

        tracing::info!(
            %agent,
            added,
            domain = self.space.domain(agent).len(),
            "ingested agent knowledge"
        );
        Ok(added)
    }

    /// Classify the illocutionary force of `sentence`.
    pub fn classify(&self, sentence: &str) -> InterpResult<Force> {
        let text = strip_mentions(sentence).to_lowercase();
        let forces = &self.config.forces;
        let prompt = self.config.prompts.render_classify(&text, forces);
        let raw = self
            .model()
            .generate(&prompt, Some(&prompts::classify_schema(forces)))?;

        let malformed = |message: String| InterpError::Classification {
            response: raw.clone(),
            message,
        };
        let value: Value =
            serde_json::from_str(strip_code_fences(&raw)).map_err(|e| malformed(e.to_string()))?;
        let name = value[prompts::FORCE_KEY]
            .as_str()
            .ok_or_else(|| malformed(format!("no \"{}\" string", prompts::FORCE_KEY)))?;
        let force: Force = name.parse().map_err(|e: crate::message::UnknownForce| {
            malformed(e.to_string())
        })?;
        if !forces.contains(&force) {
            return Err(malformed(format!("force {force} is not enabled")));
        }
        tracing::debug!(%force, "classified");
        Ok(force)
    }

    /// Translate a chat sentence into a message for `receivers` (all agents
    /// when empty). `None` for an empty sentence.
    pub fn translate_to_structured(
        &self,
        receivers: &[String],
        sentence: &str,
    ) -> InterpResult<Option<Message>> {
        let text = strip_mentions(sentence);
        if text.is_empty() {
            return Ok(None);
        }

        let force = self.classify(&text)?;
        let nearest = self
            .space
            .find_nearest(receivers, force.retrieval_subspace(), &text)?;
        let examples = self.space.examples(force, &nearest);
        let schema = Schema::infer(&examples)?;

        let term = if schema.is_empty() {
            nearest
        } else {
            self.fill_slots(&text, &nearest, force, &examples, &schema)?
        };

        let content = if force == Force::AskHow {
            Content::Trigger(Trigger::achieve(term))
        } else {
            Content::Term(term)
        };
        Ok(Some(Message::new(self.name(), force, content)))
    }

    fn fill_slots(
        &self,
        sentence: &str,
        nearest: &Term,
        force: Force,
        examples: &[Term],
        schema: &Schema,
    ) -> InterpResult<Term> {
        let records: Vec<Value> = examples
            .iter()
            .map(|t| Value::Object(to_record(t)))
            .collect();
        let prompt = self.config.prompts.render_to_structured(
            sentence,
            &Value::Object(to_record(nearest)),
            force,
            &records,
            &schema.hint_lines(),
        );
        let raw = self
            .model()
            .generate(&prompt, Some(&schema.to_json_schema()))?;
        let term = from_record(&parse_record(&raw)?)?;
        schema.check(&term)?;
        tracing::debug!(%nearest, %term, "filled slots");
        Ok(term)
    }

    /// Render an agent message as prose.
    pub fn translate_to_text(&self, message: &Message) -> InterpResult<String> {
        let prompt = self.config.prompts.render_to_text(
            &message.sender,
            message.force,
            &message.content.to_string(),
        );
        let raw = self.model().generate(&prompt, None)?;
        Ok(strip_thinking(&raw))
    }

    /// Text to show in the chat for a message an agent sent.
    pub fn handle_incoming(&self, message: &Message) -> String {
        match self.translate_to_text(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(%message, error = %e, "failed to render incoming message");
                RENDER_FAILURE_NOTICE.to_string()
            }
        }
    }

    /// Translate `sentence` and deliver it to `receivers` (broadcast when
    /// empty). Unknown receivers are dropped before any backend call.
    pub fn handle_outgoing(&self, receivers: &[String], sentence: &str) -> InterpResult<Outcome> {
        let mut known: Vec<String> = Vec::new();
        let mut unresolved: Vec<String> = Vec::new();
        for name in receivers {
            let bucket = if self.space.knows_agent(name) {
                &mut known
            } else {
                &mut unresolved
            };
            if !bucket.contains(name) {
                bucket.push(name.clone());
            }
        }
        for name in &unresolved {
            tracing::warn!(agent = %name, "mentioned agent not found");
        }
        if !receivers.is_empty() && known.is_empty() {
            let reason = InterpError::NoReceivers { names: unresolved }.to_string();
            return Ok(Outcome::Rejected { reason });
        }

        let message = match self.translate_to_structured(&known, sentence) {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(Outcome::Dropped),
            Err(e) if e.is_reportable() => {
                tracing::error!(error = %e, "translation failed");
                return Ok(Outcome::Rejected {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        if known.is_empty() {
            self.dispatch.broadcast(&message);
        } else {
            for receiver in &known {
                self.dispatch.send(receiver, &message);
            }
        }
        tracing::info!(%message, receivers = ?known, "dispatched");

        Ok(if unresolved.is_empty() {
            Outcome::Sent {
                receivers: known,
                message,
            }
        } else {
            Outcome::Partial {
                receivers: known,
                unresolved,
                message,
            }
        })
    }

    /// A raw chat line: `@name` mentions choose the receivers.
    pub fn handle_chat_line(&self, line: &str) -> InterpResult<Outcome> {
        self.handle_outgoing(&extract_mentions(line), line)
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("name", &self.config.name)
            .field("space", &self.space)
            .finish()
    }
}
