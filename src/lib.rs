// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # bdi-interpreter
//!
//! A semantic interpreter between free-text chat and BDI agents.
//!
//! Agents expose their beliefs, rules, and plans; the interpreter embeds
//! every term they know into a two-tier vector index. A user sentence is
//! classified by illocutionary force, matched to the nearest known term,
//! and rewritten by a language model into a term of the same shape, which
//! is then delivered as a KQML-style message. Messages coming back from the
//! agents are rendered as prose.
//!
//! ## Architecture
//!
//! - **Terms** (`term`): logic terms, formulas, triggers, their text syntax
//!   and the JSON record form the model reads and writes
//! - **Schema** (`schema`): argument-kind inference over same-shape examples
//! - **Embedding space** (`space`): `terms` / `plans` subspaces with
//!   per-agent domains and nearest-neighbour retrieval
//! - **Backend** (`llm`): the `LanguageModel` seam, an Ollama client and a
//!   scripted offline model
//! - **Interpreter** (`interpreter`): the chat ⇄ message pipeline and its
//!   worker-thread service
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bdi_interpreter::interpreter::{Interpreter, InterpreterConfig};
//! use bdi_interpreter::knowledge::AgentKnowledge;
//! use bdi_interpreter::llm::{OllamaClient, OllamaConfig};
//! use bdi_interpreter::message::StdoutDispatch;
//!
//! let model = OllamaClient::connect(OllamaConfig::default()).unwrap();
//! let interp = Interpreter::new(
//!     InterpreterConfig::default(),
//!     Arc::new(model),
//!     Arc::new(StdoutDispatch),
//! );
//! let bob = AgentKnowledge::parse("order(pizza, \"1999-01-01\", 12).").unwrap();
//! interp.ingest("bob", &bob).unwrap();
//! let outcome = interp.handle_chat_line("@bob I ordered sushi at 14:00").unwrap();
//! println!("{outcome:?}");
//! ```

pub mod config;
pub mod distance;
pub mod error;
pub mod interpreter;
pub mod knowledge;
pub mod llm;
pub mod message;
pub mod schema;
pub mod space;
pub mod term;
