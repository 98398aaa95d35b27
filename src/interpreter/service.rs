//! Off-loop execution of interpreter requests.
//!
//! Every translation costs one or more blocking model calls, so the chat loop
//! hands requests to [`InterpreterService`], which runs each one on its own
//! worker thread and returns a [`Pending`] handle. Independent requests run
//! concurrently; the embedding index underneath is safe to share.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{Interpreter, Outcome};
use crate::error::InterpResult;
use crate::knowledge::KnowledgeSource;
use crate::message::Message;

/// Result of a request running on a worker thread.
///
/// A request whose worker died (or could not be spawned) never yields a value.
#[derive(Debug)]
pub struct Pending<T> {
    rx: mpsc::Receiver<T>,
    done: bool,
}

impl<T> Pending<T> {
    fn new(rx: mpsc::Receiver<T>) -> Self {
        Self { rx, done: false }
    }

    /// Poll without blocking.
    pub fn try_take(&mut self) -> Option<T> {
        if self.done {
            return None;
        }
        match self.rx.try_recv() {
            Ok(value) => {
                self.done = true;
                Some(value)
            }
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => {
                self.done = true;
                None
            }
        }
    }

    /// Block until the worker finishes.
    pub fn wait(self) -> Option<T> {
        if self.done {
            return None;
        }
        self.rx.recv().ok()
    }

    /// Block for at most `timeout`. `None` either way when nothing arrived.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<T> {
        if self.done {
            return None;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(value) => {
                self.done = true;
                Some(value)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                self.done = true;
                None
            }
        }
    }

    /// Whether the value was already taken or the worker is gone.
    pub fn is_finished(&self) -> bool {
        self.done
    }
}

/// Runs interpreter requests on worker threads.
#[derive(Debug, Clone)]
pub struct InterpreterService {
    interpreter: Arc<Interpreter>,
}

impl InterpreterService {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            interpreter: Arc::new(interpreter),
        }
    }

    pub fn interpreter(&self) -> &Arc<Interpreter> {
        &self.interpreter
    }

    pub fn handle_outgoing(
        &self,
        receivers: Vec<String>,
        sentence: String,
    ) -> Pending<InterpResult<Outcome>> {
        self.spawn("interp-outgoing", move |interp| {
            interp.handle_outgoing(&receivers, &sentence)
        })
    }

    pub fn handle_chat_line(&self, line: String) -> Pending<InterpResult<Outcome>> {
        self.spawn("interp-chat", move |interp| interp.handle_chat_line(&line))
    }

    pub fn handle_incoming(&self, message: Message) -> Pending<String> {
        self.spawn("interp-incoming", move |interp| {
            interp.handle_incoming(&message)
        })
    }

    pub fn ingest(
        &self,
        agent: String,
        source: Arc<dyn KnowledgeSource>,
    ) -> Pending<InterpResult<usize>> {
        self.spawn("interp-ingest", move |interp| {
            interp.ingest(&agent, source.as_ref())
        })
    }

    fn spawn<T, F>(&self, name: &str, job: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&Interpreter) -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let interp = Arc::clone(&self.interpreter);
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // The caller may have dropped its handle.
                let _ = tx.send(job(&interp));
            });
        if let Err(e) = spawned {
            tracing::error!(worker = name, error = %e, "failed to spawn interpreter worker");
        }
        Pending::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::InterpreterConfig;
    use crate::knowledge::AgentKnowledge;
    use crate::llm::ScriptedModel;
    use crate::message::{CollectingDispatch, Force};

    fn service(model: Arc<ScriptedModel>, dispatch: Arc<CollectingDispatch>) -> InterpreterService {
        InterpreterService::new(Interpreter::new(
            InterpreterConfig::default(),
            model,
            dispatch,
        ))
    }

    #[test]
    fn ingest_and_send_on_workers() {
        let model = Arc::new(ScriptedModel::default());
        let dispatch = Arc::new(CollectingDispatch::new());
        let svc = service(model.clone(), dispatch.clone());

        let knowledge = Arc::new(AgentKnowledge::parse("price(pizza, 12).").unwrap());
        let added = svc.ingest("bob".into(), knowledge).wait().unwrap().unwrap();
        assert_eq!(added, 1);

        model.push_response(r#"{"Illocutionary Force": "askOne"}"#);
        model.push_response(r#"{"functor": "price", "arg0": "pizza", "arg1": null}"#);
        let outcome = svc
            .handle_chat_line("@bob how much is a pizza?".into())
            .wait()
            .unwrap()
            .unwrap();
        assert!(outcome.is_delivered());
        let delivered = dispatch.take();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].message.force, Force::AskOne);
        assert_eq!(delivered[0].message.content.to_string(), "price(pizza,_)");
    }

    #[test]
    fn concurrent_ingestion_embeds_shared_terms_once() {
        let model = Arc::new(ScriptedModel::default());
        let svc = service(model.clone(), Arc::new(CollectingDispatch::new()));
        let shared: Arc<dyn KnowledgeSource> =
            Arc::new(AgentKnowledge::parse("likes(X, pizza).\nopen(shop).").unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| svc.ingest(format!("agent{i}"), Arc::clone(&shared)))
            .collect();
        let total: usize = handles
            .into_iter()
            .map(|h| h.wait().unwrap().unwrap())
            .sum();

        assert_eq!(total, 2);
        assert_eq!(model.embed_calls(), 2);
        assert_eq!(svc.interpreter().space().agents().len(), 8);
    }

    #[test]
    fn incoming_rendering_polls_until_ready() {
        let model = Arc::new(ScriptedModel::default().with_responses(["Bob is hungry."]));
        let svc = service(model, Arc::new(CollectingDispatch::new()));
        let msg = Message::new("bob", Force::Tell, "hungry(bob)".parse::<crate::term::Term>().unwrap());

        let mut pending = svc.handle_incoming(msg);
        let text = pending.wait_timeout(Duration::from_secs(10));
        assert_eq!(text.as_deref(), Some("Bob is hungry."));
        assert!(pending.is_finished());
        assert_eq!(pending.try_take(), None);
    }
}
