//! Agent communication messages and delivery.
//!
//! A [`Message`] is what the interpreter hands to the agent runtime: a sender,
//! an illocutionary [`Force`] and a structured [`Content`]. Delivery goes
//! through the [`Dispatch`] trait, implemented by the runtime; the crate ships
//! a printing dispatcher for the CLI and a collecting one for tests.

use std::fmt;
use std::sync::Mutex;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::space::Subspace;
use crate::term::{Term, Trigger};

// ── Force ───────────────────────────────────────────────────────────────

/// Illocutionary force: the communicative intent of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Force {
    Tell,
    Achieve,
    AskOne,
    AskAll,
    AskHow,
}

impl Force {
    pub const ALL: [Force; 5] = [
        Force::Tell,
        Force::Achieve,
        Force::AskOne,
        Force::AskAll,
        Force::AskHow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tell => "tell",
            Self::Achieve => "achieve",
            Self::AskOne => "askOne",
            Self::AskAll => "askAll",
            Self::AskHow => "askHow",
        }
    }

    /// Where the nearest term for a sentence of this force is searched.
    pub fn retrieval_subspace(self) -> Subspace {
        match self {
            Self::Achieve => Subspace::Plans,
            _ => Subspace::Terms,
        }
    }

    /// Where same-shape examples for the schema are collected.
    pub fn example_subspace(self) -> Subspace {
        match self {
            Self::Achieve | Self::AskHow => Subspace::Plans,
            _ => Subspace::Terms,
        }
    }
}

impl fmt::Display for Force {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("unknown illocutionary force \"{0}\"")]
#[diagnostic(
    code(interp::message::unknown_force),
    help("Valid forces are: tell, achieve, askOne, askAll, askHow.")
)]
pub struct UnknownForce(pub String);

impl std::str::FromStr for Force {
    type Err = UnknownForce;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Force::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| UnknownForce(s.to_string()))
    }
}

// ── Message ─────────────────────────────────────────────────────────────

/// Propositional content: a plain term, or a trigger for `askHow`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Term(Term),
    Trigger(Trigger),
}

impl Content {
    /// The literal inside, whichever form the content takes.
    pub fn literal(&self) -> &Term {
        match self {
            Self::Term(t) => t,
            Self::Trigger(t) => &t.literal,
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term(t) => write!(f, "{t}"),
            Self::Trigger(t) => write!(f, "{t}"),
        }
    }
}

impl From<Term> for Content {
    fn from(t: Term) -> Self {
        Self::Term(t)
    }
}

impl From<Trigger> for Content {
    fn from(t: Trigger) -> Self {
        Self::Trigger(t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: String,
    pub force: Force,
    pub content: Content,
}

impl Message {
    pub fn new(sender: impl Into<String>, force: Force, content: impl Into<Content>) -> Self {
        Self {
            sender: sender.into(),
            force,
            content: content.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {}, {}>", self.sender, self.force, self.content)
    }
}

// ── Dispatch ────────────────────────────────────────────────────────────

/// The runtime's delivery hook.
pub trait Dispatch: Send + Sync {
    fn send(&self, receiver: &str, message: &Message);

    /// Deliver to every agent.
    fn broadcast(&self, message: &Message);
}

/// Prints deliveries to stdout.
pub struct StdoutDispatch;

impl Dispatch for StdoutDispatch {
    fn send(&self, receiver: &str, message: &Message) {
        println!("[-> {receiver}] {message}");
    }

    fn broadcast(&self, message: &Message) {
        println!("[-> *] {message}");
    }
}

/// One recorded delivery; `receiver` is `None` for broadcasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub receiver: Option<String>,
    pub message: Message,
}

/// Collects deliveries in memory.
pub struct CollectingDispatch {
    deliveries: Mutex<Vec<Delivery>>,
}

impl CollectingDispatch {
    pub fn new() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
        }
    }

    /// All deliveries so far, oldest first.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.lock().clone()
    }

    pub fn take(&self) -> Vec<Delivery> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Delivery>> {
        self.deliveries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record(&self, receiver: Option<&str>, message: &Message) {
        self.lock().push(Delivery {
            receiver: receiver.map(str::to_string),
            message: message.clone(),
        });
    }
}

impl Default for CollectingDispatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatch for CollectingDispatch {
    fn send(&self, receiver: &str, message: &Message) {
        self.record(Some(receiver), message);
    }

    fn broadcast(&self, message: &Message) {
        self.record(None, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_names_round_trip() {
        for force in Force::ALL {
            assert_eq!(force.as_str().parse::<Force>().unwrap(), force);
        }
        assert!("ask".parse::<Force>().is_err());
        assert_eq!(" askHow ".parse::<Force>().unwrap(), Force::AskHow);
    }

    #[test]
    fn force_serde_uses_wire_names() {
        let json = serde_json::to_string(&[Force::AskOne, Force::Tell]).unwrap();
        assert_eq!(json, "[\"askOne\",\"tell\"]");
    }

    #[test]
    fn subspace_per_force() {
        assert_eq!(Force::Achieve.retrieval_subspace(), Subspace::Plans);
        assert_eq!(Force::AskHow.retrieval_subspace(), Subspace::Terms);
        assert_eq!(Force::AskHow.example_subspace(), Subspace::Plans);
        assert_eq!(Force::Tell.example_subspace(), Subspace::Terms);
    }

    #[test]
    fn message_display() {
        let term: Term = "order(sushi, _, 14)".parse().unwrap();
        let m = Message::new("interpreter", Force::Tell, term.clone());
        assert_eq!(m.to_string(), "<interpreter, tell, order(sushi,_,14)>");
        let m = Message::new("interpreter", Force::AskHow, Trigger::achieve(term));
        assert_eq!(m.to_string(), "<interpreter, askHow, +!order(sushi,_,14)>");
        assert_eq!(m.content.literal().functor(), "order");
    }

    #[test]
    fn collecting_dispatch_records_deliveries() {
        let d = CollectingDispatch::new();
        let m = Message::new("me", Force::Tell, Term::atom("hello"));
        d.send("bob", &m);
        d.broadcast(&m);
        assert_eq!(d.len(), 2);
        let all = d.take();
        assert_eq!(all[0].receiver.as_deref(), Some("bob"));
        assert_eq!(all[1].receiver, None);
        assert!(d.is_empty());
    }
}
