//! Agent knowledge: the fact store and plan library the interpreter indexes.
//!
//! The agent runtime owns the real belief bases and plan libraries; it exposes
//! them through [`KnowledgeSource`]. [`AgentKnowledge`] is an in-memory source
//! built from AgentSpeak source text, used by the CLI and by tests.

use std::path::Path;

use miette::Diagnostic;
use thiserror::Error;

use crate::term::{parse_program, Clause, Formula, Term, Trigger};

#[derive(Debug, Error, Diagnostic)]
pub enum KnowledgeError {
    #[error("failed to read agent source: {path}")]
    #[diagnostic(
        code(interp::knowledge::read),
        help("Check the path given with --agent or in the [[agents]] section.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse agent source: {path}")]
    #[diagnostic(code(interp::knowledge::parse))]
    Parse {
        path: String,
        #[source]
        #[diagnostic_source]
        source: crate::error::TermError,
    },
}

pub type KnowledgeResult<T> = std::result::Result<T, KnowledgeError>;

/// A belief or rule. `body` is present for rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub head: Term,
    pub body: Option<Formula>,
    /// The `source(...)` annotation, if any.
    pub source: Option<String>,
}

impl Fact {
    pub fn belief(head: Term) -> Self {
        Self {
            head,
            body: None,
            source: None,
        }
    }

    pub fn rule(head: Term, body: Formula) -> Self {
        Self {
            head,
            body: Some(body),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn is_rule(&self) -> bool {
        self.body.is_some()
    }

    /// Protocol bookkeeping, or a belief the interpreter itself planted.
    pub fn is_system(&self, interpreter: &str) -> bool {
        self.source.as_deref() == Some(interpreter) || is_kqml(self.head.functor())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub label: Option<String>,
    pub trigger: Trigger,
    pub context: Option<Formula>,
}

impl Plan {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            label: None,
            trigger,
            context: None,
        }
    }

    /// The communication-protocol plans every agent carries.
    pub fn is_system(&self) -> bool {
        self.label.as_deref().is_some_and(|l| l.starts_with("kqml"))
    }
}

fn is_kqml(functor: &str) -> bool {
    functor.starts_with("kqml::") || functor.starts_with("kqml_")
}

/// Read access to one agent's beliefs and plans.
pub trait KnowledgeSource: Send + Sync {
    /// Snapshot of the fact store.
    fn facts(&self) -> Vec<Fact>;

    /// Snapshot of the plan library.
    fn plans(&self) -> Vec<Plan>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentKnowledge {
    facts: Vec<Fact>,
    plans: Vec<Plan>,
}

impl AgentKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from AgentSpeak source text. Initial goals are ignored.
    pub fn parse(src: &str) -> crate::error::TermResult<Self> {
        let mut knowledge = Self::new();
        for clause in parse_program(src)? {
            match clause {
                Clause::Belief { literal, source } => knowledge.facts.push(Fact {
                    head: literal,
                    body: None,
                    source,
                }),
                Clause::Rule { head, body, source } => knowledge.facts.push(Fact {
                    head,
                    body: Some(body),
                    source,
                }),
                Clause::Plan {
                    label,
                    trigger,
                    context,
                } => knowledge.plans.push(Plan {
                    label,
                    trigger,
                    context,
                }),
                Clause::InitialGoal(_) => {}
            }
        }
        Ok(knowledge)
    }

    /// Read and parse an `.asl` file.
    pub fn load(path: &Path) -> KnowledgeResult<Self> {
        let src = std::fs::read_to_string(path).map_err(|source| KnowledgeError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&src).map_err(|source| KnowledgeError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn add_fact(&mut self, fact: Fact) {
        self.facts.push(fact);
    }

    pub fn add_plan(&mut self, plan: Plan) {
        self.plans.push(plan);
    }
}

impl KnowledgeSource for AgentKnowledge {
    fn facts(&self) -> Vec<Fact> {
        self.facts.clone()
    }

    fn plans(&self) -> Vec<Plan> {
        self.plans.clone()
    }
}
