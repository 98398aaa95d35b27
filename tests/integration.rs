//! End-to-end tests for the interpreter.
//!
//! These run the whole chat ⇄ message pipeline against the scripted model:
//! agent knowledge goes into the embedding space, chat lines come out as
//! dispatched messages, and agent messages come back as prose.

use std::sync::Arc;

use bdi_interpreter::config::Settings;
use bdi_interpreter::error::{ErrorCategory, InterpError};
use bdi_interpreter::interpreter::{
    Interpreter, InterpreterConfig, InterpreterService, Outcome, RENDER_FAILURE_NOTICE,
};
use bdi_interpreter::knowledge::{AgentKnowledge, KnowledgeSource};
use bdi_interpreter::llm::ScriptedModel;
use bdi_interpreter::message::{CollectingDispatch, Content, Force, Message};
use bdi_interpreter::space::Subspace;
use bdi_interpreter::term::{Term, Trigger};

const BOB: &str = r#"
    // Bob runs a restaurant.
    order(pizza, "1999-01-01", 12).
    hungry(X) :- stomach(X, empty) & time(T) & T > 12.

    @deliver_plan
    +!deliver(Food, Address) : has(Food) <- .print("delivering ", Food).
"#;

const ALICE: &str = "weather(sunny).\n";

struct Harness {
    model: Arc<ScriptedModel>,
    dispatch: Arc<CollectingDispatch>,
    interp: Interpreter,
}

fn harness() -> Harness {
    let model = Arc::new(ScriptedModel::default());
    let dispatch = Arc::new(CollectingDispatch::new());
    let interp = Interpreter::new(
        InterpreterConfig::default(),
        model.clone(),
        dispatch.clone(),
    );
    interp
        .ingest("bob", &AgentKnowledge::parse(BOB).unwrap())
        .unwrap();
    interp
        .ingest("alice", &AgentKnowledge::parse(ALICE).unwrap())
        .unwrap();
    Harness {
        model,
        dispatch,
        interp,
    }
}

fn t(s: &str) -> Term {
    s.parse().unwrap()
}

#[test]
fn order_sentence_reaches_bob_as_a_tell() {
    let h = harness();
    h.model.push_response(r#"{"Illocutionary Force": "tell"}"#);
    h.model
        .push_response(r#"{"functor": "order", "arg0": "sushi", "arg1": null, "arg2": 14}"#);

    let outcome = h
        .interp
        .handle_chat_line("@bob I ordered sushi at 14:00")
        .unwrap();

    let expected = Message::new("interpreter", Force::Tell, t("order(sushi, _, 14)"));
    assert_eq!(
        outcome,
        Outcome::Sent {
            receivers: vec!["bob".into()],
            message: expected.clone(),
        }
    );
    let delivered = h.dispatch.deliveries();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].receiver.as_deref(), Some("bob"));
    assert_eq!(delivered[0].message, expected);
    assert_eq!(
        delivered[0].message.to_string(),
        "<interpreter, tell, order(sushi,_,14)>"
    );

    // The slot-filling request carried the schema of the nearest term.
    let calls = h.model.calls();
    assert_eq!(calls.len(), 2);
    let schema = calls[1].format.as_ref().unwrap();
    assert_eq!(schema["properties"]["functor"]["const"], "order");
    assert_eq!(schema["required"].as_array().unwrap().len(), 4);
    assert!(calls[1].prompt.contains("Sentence: I ordered sushi at 14:00"));
}

#[test]
fn shared_terms_are_embedded_once() {
    let model = Arc::new(ScriptedModel::default());
    let interp = Interpreter::new(
        InterpreterConfig::default(),
        model.clone(),
        Arc::new(CollectingDispatch::new()),
    );
    let shared = AgentKnowledge::parse("open(shop).").unwrap();

    assert_eq!(interp.ingest("bob", &shared).unwrap(), 1);
    assert_eq!(interp.ingest("alice", &shared).unwrap(), 0);
    assert_eq!(model.embed_calls(), 1);
    assert_eq!(interp.space().len(Subspace::Terms), 1);
    assert_eq!(interp.space().domain("bob"), vec![t("open(shop)")]);
    assert_eq!(interp.space().domain("alice"), vec![t("open(shop)")]);
}

#[test]
fn retrieval_is_scoped_to_the_addressed_agents() {
    let h = harness();

    // Addressed to alice, only her weather belief is a candidate.
    h.model.push_response(r#"{"Illocutionary Force": "tell"}"#);
    h.model
        .push_response(r#"{"functor": "weather", "arg0": "sushi"}"#);
    let outcome = h
        .interp
        .handle_chat_line("@alice I ordered sushi at 14:00")
        .unwrap();
    assert_eq!(
        outcome.message().map(|m| m.content.clone()),
        Some(Content::Term(t("weather(sushi)")))
    );
    let schema = h.model.calls()[1].format.clone().unwrap();
    assert_eq!(schema["properties"]["functor"]["const"], "weather");

    // Without mentions the whole subspace is searched and the message is broadcast.
    h.model.push_response(r#"{"Illocutionary Force": "tell"}"#);
    h.model
        .push_response(r#"{"functor": "order", "arg0": "sushi", "arg1": null, "arg2": 14}"#);
    let outcome = h.interp.handle_chat_line("I ordered sushi at 14:00").unwrap();
    assert!(matches!(&outcome, Outcome::Sent { receivers, .. } if receivers.is_empty()));
    let last = h.dispatch.deliveries().pop().unwrap();
    assert_eq!(last.receiver, None);
    assert_eq!(last.message.content, Content::Term(t("order(sushi,_,14)")));
}

#[test]
fn achieve_goals_come_from_the_plan_subspace() {
    let h = harness();
    h.model.push_response(r#"{"Illocutionary Force": "achieve"}"#);
    h.model
        .push_response(r#"{"functor": "deliver", "arg0": "pizza", "arg1": "\"Main Street 1\""}"#);

    let outcome = h
        .interp
        .handle_chat_line("@bob deliver a pizza to Main Street 1")
        .unwrap();
    let message = outcome.message().unwrap();
    assert_eq!(message.force, Force::Achieve);
    assert_eq!(
        message.content,
        Content::Term(t(r#"deliver(pizza, "Main Street 1")"#))
    );
}

#[test]
fn ask_how_is_sent_as_a_goal_trigger() {
    let h = harness();
    h.model.push_response(r#"{"Illocutionary Force": "askHow"}"#);
    h.model
        .push_response(r#"{"functor": "order", "arg0": "sushi", "arg1": null, "arg2": null}"#);

    let outcome = h
        .interp
        .handle_chat_line("@bob how do I order sushi?")
        .unwrap();
    let message = outcome.message().unwrap();
    assert_eq!(
        message.content,
        Content::Trigger(Trigger::achieve(t("order(sushi, _, _)")))
    );
    assert_eq!(message.to_string(), "<interpreter, askHow, +!order(sushi,_,_)>");
}

#[test]
fn empty_sentences_make_no_backend_calls() {
    let h = harness();
    let embeds = h.model.embed_calls();

    assert_eq!(h.interp.handle_chat_line("@bob").unwrap(), Outcome::Dropped);
    assert_eq!(h.interp.handle_chat_line("   ").unwrap(), Outcome::Dropped);

    assert_eq!(h.model.generate_calls(), 0);
    assert_eq!(h.model.embed_calls(), embeds);
    assert!(h.dispatch.is_empty());
}

#[test]
fn unknown_receivers_are_rejected_or_dropped() {
    let h = harness();

    let outcome = h.interp.handle_chat_line("@carol hello").unwrap();
    assert!(matches!(&outcome, Outcome::Rejected { reason } if reason.contains("carol")));
    assert_eq!(h.model.generate_calls(), 0);

    h.model.push_response(r#"{"Illocutionary Force": "tell"}"#);
    h.model
        .push_response(r#"{"functor": "order", "arg0": "sushi", "arg1": null, "arg2": 14}"#);
    let outcome = h
        .interp
        .handle_chat_line("@bob @carol I ordered sushi at 14:00")
        .unwrap();
    match outcome {
        Outcome::Partial {
            receivers,
            unresolved,
            ..
        } => {
            assert_eq!(receivers, vec!["bob"]);
            assert_eq!(unresolved, vec!["carol"]);
        }
        other => panic!("expected partial delivery, got {other:?}"),
    }
    assert_eq!(h.dispatch.len(), 1);
}

#[test]
fn agent_without_candidates_is_rejected() {
    let h = harness();
    h.interp.ingest("carol", &AgentKnowledge::new()).unwrap();
    h.model.push_response(r#"{"Illocutionary Force": "tell"}"#);

    let outcome = h.interp.handle_chat_line("@carol it is sunny").unwrap();
    assert!(matches!(outcome, Outcome::Rejected { .. }));
    assert!(h.dispatch.is_empty());
}

#[test]
fn invariant_violations_propagate() {
    let model = Arc::new(ScriptedModel::default());
    let interp = Interpreter::new(
        InterpreterConfig::default(),
        model.clone(),
        Arc::new(CollectingDispatch::new()),
    );
    model.set_embedding("void void void void ", vec![0.0; 256]);

    let err = interp
        .ingest("bob", &AgentKnowledge::parse("void.").unwrap())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvariantViolation);
    assert!(matches!(err, InterpError::Space(_)));
}

#[test]
fn incoming_messages_are_rendered_as_prose() {
    let h = harness();
    h.model
        .push_response("<think>\nthe agent states a price\n</think>\nBob says a pizza costs 12.");

    let message = Message::new("bob", Force::Tell, t("price(pizza, 12)"));
    assert_eq!(h.interp.handle_incoming(&message), "Bob says a pizza costs 12.");

    // Queue exhausted: the scripted backend fails and the fixed notice is shown.
    assert_eq!(h.interp.handle_incoming(&message), RENDER_FAILURE_NOTICE);
}

#[test]
fn service_runs_requests_off_the_caller_thread() {
    let model = Arc::new(ScriptedModel::default());
    let dispatch = Arc::new(CollectingDispatch::new());
    let service = InterpreterService::new(Interpreter::new(
        InterpreterConfig::default(),
        model.clone(),
        dispatch.clone(),
    ));

    let bob: Arc<dyn KnowledgeSource> = Arc::new(AgentKnowledge::parse(BOB).unwrap());
    let alice: Arc<dyn KnowledgeSource> = Arc::new(AgentKnowledge::parse(ALICE).unwrap());
    let first = service.ingest("bob".into(), bob);
    let second = service.ingest("alice".into(), alice);
    assert!(first.wait().unwrap().is_ok());
    assert!(second.wait().unwrap().is_ok());
    assert_eq!(service.interpreter().space().agents(), vec!["alice", "bob"]);

    model.push_response(r#"{"Illocutionary Force": "tell"}"#);
    model.push_response(r#"{"functor": "weather", "arg0": "rainy"}"#);
    let outcome = service
        .handle_outgoing(vec!["alice".into()], "the weather is rainy today".into())
        .wait()
        .unwrap()
        .unwrap();
    assert_eq!(
        outcome.message().map(|m| m.content.to_string()),
        Some("weather(rainy)".to_string())
    );
    assert_eq!(dispatch.take()[0].receiver.as_deref(), Some("alice"));
}

#[test]
fn agents_load_from_a_config_file() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("bob.asl"), BOB).unwrap();
    std::fs::write(dir.path().join("alice.asl"), ALICE).unwrap();
    let config = dir.path().join("chat.toml");
    std::fs::write(
        &config,
        r#"
        [interpreter]
        name = "chat"
        forces = ["tell", "askOne"]

        [[agents]]
        name = "bob"
        source = "bob.asl"

        [[agents]]
        name = "alice"
        source = "alice.asl"
        "#,
    )
    .unwrap();

    let settings = Settings::load(&config).unwrap();
    let model = Arc::new(ScriptedModel::default());
    let interp = Interpreter::new(
        settings.interpreter.clone(),
        model.clone(),
        Arc::new(CollectingDispatch::new()),
    );
    for (name, knowledge) in settings.load_agents().unwrap() {
        interp.ingest(&name, &knowledge).unwrap();
    }

    assert_eq!(interp.name(), "chat");
    assert!(interp.space().knows_agent("bob"));
    assert!(interp.space().knows_agent("alice"));
    assert!(interp
        .space()
        .contains_in(Subspace::Plans, &t("deliver(Food, Address)")));

    // Only the configured forces are offered to the classifier.
    model.push_response(r#"{"Illocutionary Force": "achieve"}"#);
    let outcome = interp.handle_chat_line("@bob deliver pizza").unwrap();
    assert!(matches!(outcome, Outcome::Rejected { .. }));
    let schema = model.calls()[0].format.clone().unwrap();
    assert_eq!(
        schema["properties"]["Illocutionary Force"]["enum"],
        serde_json::json!(["tell", "askOne"])
    );
}
