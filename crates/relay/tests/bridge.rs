use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_test::{assert_pending, assert_ready};

use relay::agent::{AgentCore, EventStream};
use relay::engine::scripted::{ScriptedEngine, Step};
use relay::engine::{Engine, EngineError, NativeStream, RunRequest};
use relay::errors::AgentError;
use relay::models::event::{Event, EventKind, META_AGENT, META_ERROR_TYPE, META_EVENT_TYPE};

/// An engine that cannot be reached at all
struct UnreachableEngine;

#[async_trait]
impl Engine for UnreachableEngine {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn run(&self, _request: RunRequest) -> Result<NativeStream, EngineError> {
        Err(EngineError::Connection("connection refused".to_string()))
    }
}

fn say(agent: &str, text: &str) -> Step {
    Step::Say {
        agent: agent.to_string(),
        text: text.to_string(),
    }
}

fn ask(prompt: &str) -> Step {
    Step::Ask {
        prompt: prompt.to_string(),
    }
}

fn kinds(events: &[Event]) -> Vec<EventKind> {
    events.iter().map(Event::kind).collect()
}

/// Drain until the next input request, returning everything seen on the way
async fn until_input(stream: &mut EventStream) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Some(event) = stream.next().await {
        let stop = event.kind() == EventKind::InputRequest || event.is_terminal();
        seen.push(event);
        if stop {
            break;
        }
    }
    seen
}

#[tokio::test]
async fn test_plain_conversation_completes() {
    let engine = Arc::new(ScriptedEngine::from_steps(vec![
        Step::Raw {
            kind: "group_chat_message".to_string(),
            payload: json!("the group is assembled"),
        },
        Step::Raw {
            kind: "select_speaker".to_string(),
            payload: json!({"speaker": "planner"}),
        },
    ]));
    let agent = AgentCore::new(engine);

    let events: Vec<Event> = agent.chat("Hello").unwrap().collect().await;

    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Message,
            EventKind::Message,
            EventKind::Message,
            EventKind::Completed
        ]
    );
    assert!(events.iter().all(|event| !event.content().is_empty()));
    assert_eq!(events[0].content(), "Hello");
    assert_eq!(events[2].metadata_str(META_EVENT_TYPE), Some("select_speaker"));
}

#[tokio::test]
async fn test_answer_reaches_engine_and_conversation_completes() {
    let engine = Arc::new(ScriptedEngine::from_steps(vec![
        ask("pick a city"),
        Step::Echo {
            agent: "planner".to_string(),
        },
    ]));
    let agent = AgentCore::new(engine.clone());
    let mut stream = agent.chat("Plan a trip").unwrap();

    let seen = until_input(&mut stream).await;
    let request = seen.last().unwrap();
    assert_eq!(request.kind(), EventKind::InputRequest);
    assert_eq!(request.prompt(), "pick a city");
    assert_eq!(agent.pending_continuations(), vec![request.id().to_string()]);

    agent.respond(request.id(), "Paris").unwrap();
    assert!(agent.pending_continuations().is_empty());

    let rest: Vec<Event> = stream.collect().await;
    assert_eq!(
        kinds(&rest),
        vec![EventKind::AgentResponse, EventKind::Completed]
    );
    assert_eq!(rest[0].content(), "Paris");
    assert_eq!(rest[0].metadata_str(META_AGENT), Some("planner"));
    assert_eq!(engine.received_answers(), vec!["Paris".to_string()]);
}

#[tokio::test]
async fn test_unknown_id_leaves_conversation_untouched() {
    let engine = Arc::new(ScriptedEngine::from_steps(vec![ask("pick a city")]));
    let agent = AgentCore::new(engine.clone());
    let mut stream = agent.chat("Plan a trip").unwrap();
    let request = until_input(&mut stream).await.pop().unwrap();

    let err = agent.respond("does-not-exist", "x").unwrap_err();
    assert_eq!(err, AgentError::unknown_continuation("does-not-exist"));
    assert_eq!(agent.pending_continuations(), vec![request.id().to_string()]);
    assert!(engine.received_answers().is_empty());

    agent.respond(request.id(), "Lisbon").unwrap();
    let rest: Vec<Event> = stream.collect().await;
    assert_eq!(kinds(&rest), vec![EventKind::Completed]);
    assert_eq!(engine.received_answers(), vec!["Lisbon".to_string()]);
}

#[tokio::test]
async fn test_engine_failure_ends_with_one_error() {
    let engine = Arc::new(ScriptedEngine::from_steps(vec![
        say("planner", "first idea"),
        Step::Fail {
            category: "rate_limited".to_string(),
            message: "slow down".to_string(),
        },
        say("planner", "never said"),
    ]));
    let agent = AgentCore::new(engine);

    let events: Vec<Event> = agent.chat("Hello").unwrap().collect().await;

    assert_eq!(
        kinds(&events),
        vec![EventKind::Message, EventKind::AgentResponse, EventKind::Error]
    );
    assert_eq!(events[1].content(), "first idea");
    let error = events.last().unwrap();
    assert_eq!(error.metadata_str(META_ERROR_TYPE), Some("rate_limited"));
    assert!(error.content().contains("slow down"));
}

#[tokio::test]
async fn test_in_band_error_notification_is_terminal() {
    let engine = Arc::new(ScriptedEngine::from_steps(vec![
        Step::Raw {
            kind: "error".to_string(),
            payload: json!("tool crashed"),
        },
        say("planner", "never said"),
    ]));
    let agent = AgentCore::new(engine);

    let events: Vec<Event> = agent.chat("Hello").unwrap().collect().await;
    assert_eq!(kinds(&events), vec![EventKind::Message, EventKind::Error]);
    assert_eq!(events[1].metadata_str(META_ERROR_TYPE), Some("engine_error"));
}

#[tokio::test]
async fn test_unreachable_engine_reports_connection_error() {
    let agent = AgentCore::new(Arc::new(UnreachableEngine));

    let events: Vec<Event> = agent.chat("Hello").unwrap().collect().await;
    assert_eq!(kinds(&events), vec![EventKind::Error]);
    assert_eq!(events[0].metadata_str(META_ERROR_TYPE), Some("connection"));
    assert!(!agent.is_in_flight());
}

#[tokio::test]
async fn test_second_answer_is_rejected() {
    let engine = Arc::new(ScriptedEngine::from_steps(vec![ask("pick a city"), ask("and a hotel")]));
    let agent = AgentCore::new(engine.clone());
    let mut stream = agent.chat("Plan a trip").unwrap();

    let first = until_input(&mut stream).await.pop().unwrap();
    agent.respond(first.id(), "Paris").unwrap();

    let err = agent.respond(first.id(), "Rome").unwrap_err();
    assert_eq!(err, AgentError::double_answer(first.id()));

    let second = until_input(&mut stream).await.pop().unwrap();
    assert_ne!(first.id(), second.id());
    agent.respond(second.id(), "Le Meurice").unwrap();

    let rest: Vec<Event> = stream.collect().await;
    assert_eq!(kinds(&rest), vec![EventKind::Completed]);
    assert_eq!(
        engine.received_answers(),
        vec!["Paris".to_string(), "Le Meurice".to_string()]
    );
}

#[tokio::test]
async fn test_waiting_for_input_is_a_suspension() {
    let engine = Arc::new(ScriptedEngine::from_steps(vec![
        ask("pick a city"),
        Step::Echo {
            agent: "planner".to_string(),
        },
    ]));
    let agent = AgentCore::new(engine);
    let mut stream = agent.chat("Plan a trip").unwrap();
    let request = until_input(&mut stream).await.pop().unwrap();

    let mut next = tokio_test::task::spawn(stream.next());
    assert_pending!(next.poll());

    agent.respond(request.id(), "Porto").unwrap();
    assert!(next.is_woken());
    let event = assert_ready!(next.poll()).unwrap();
    assert_eq!(event.content(), "Porto");
}

#[tokio::test]
async fn test_second_conversation_progresses_while_first_waits() {
    let waiting = Arc::new(AgentCore::new(Arc::new(ScriptedEngine::from_steps(vec![
        ask("pick a city"),
        say("planner", "noted"),
    ]))));
    let (id_tx, mut id_rx) = mpsc::channel(1);

    let mut stream = waiting.chat("first").unwrap();
    let first = tokio::spawn(async move {
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            if event.kind() == EventKind::InputRequest {
                id_tx.send(event.id().to_string()).await.unwrap();
            }
            events.push(event);
        }
        events
    });

    let id = id_rx.recv().await.unwrap();

    let other = AgentCore::new(Arc::new(ScriptedEngine::from_steps(vec![say("planner", "done")])));
    let events: Vec<Event> = other.chat("second").unwrap().collect().await;
    assert_eq!(events.last().unwrap().kind(), EventKind::Completed);
    assert!(!first.is_finished());

    waiting.respond(&id, "Paris").unwrap();
    let events = first.await.unwrap();
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Message,
            EventKind::InputRequest,
            EventKind::AgentResponse,
            EventKind::Completed
        ]
    );
}

#[tokio::test]
async fn test_cancel_releases_pending_input() {
    let engine = Arc::new(ScriptedEngine::from_steps(vec![ask("pick a city"), say("planner", "never")]));
    let agent = AgentCore::new(engine.clone());
    let mut stream = agent.chat("Plan a trip").unwrap();
    let request = until_input(&mut stream).await.pop().unwrap();

    assert!(agent.cancel());
    assert!(agent.pending_continuations().is_empty());

    let rest: Vec<Event> = stream.collect().await;
    assert_eq!(kinds(&rest), vec![EventKind::Error]);
    assert_eq!(rest[0].metadata_str(META_ERROR_TYPE), Some("cancelled"));
    assert!(agent.respond(request.id(), "too late").is_err());
    assert!(engine.received_answers().is_empty());
    assert!(!agent.is_in_flight());
}

#[tokio::test]
async fn test_cancel_while_running() {
    let engine = Arc::new(ScriptedEngine::from_steps(vec![
        say("planner", "one"),
        say("planner", "two"),
    ]));
    let agent = AgentCore::new(engine);
    let mut stream = agent.chat("Plan a trip").unwrap();
    let opener = stream.next().await.unwrap();
    assert_eq!(opener.kind(), EventKind::Message);

    agent.cancel();
    let rest: Vec<Event> = stream.collect().await;
    assert_eq!(kinds(&rest), vec![EventKind::Error]);
}

#[tokio::test]
async fn test_invalid_bytes_are_counted_not_fatal() {
    let engine = Arc::new(ScriptedEngine::from_steps(vec![Step::Bytes {
        kind: "image".to_string(),
        data: vec![0xde, 0xad, 0xbe, 0xef],
    }]));
    let agent = AgentCore::new(engine);

    let events: Vec<Event> = agent.chat("Hello").unwrap().collect().await;
    assert_eq!(
        kinds(&events),
        vec![EventKind::Message, EventKind::Message, EventKind::Completed]
    );
    assert!(events[1].content().contains('\u{fffd}'));
    assert_eq!(agent.fallback_count(), 1);
}

#[tokio::test]
async fn test_max_rounds_bounds_the_run() {
    let engine = Arc::new(ScriptedEngine::from_steps(vec![
        say("planner", "one"),
        say("planner", "two"),
        say("planner", "three"),
    ]));
    let agent = AgentCore::with_config(
        engine.clone(),
        relay::agent::AgentConfig { max_rounds: 2 },
    );

    let events: Vec<Event> = agent.chat("Hello").unwrap().collect().await;
    assert_eq!(events.len(), 4);
    assert_eq!(engine.received_requests()[0].max_rounds, 2);
}

#[tokio::test]
async fn test_terminal_event_frees_the_agent_for_the_next_chat() {
    let engine = Arc::new(ScriptedEngine::from_steps(vec![
        ask("pick a city"),
        Step::Echo {
            agent: "planner".to_string(),
        },
    ]));
    let agent = AgentCore::new(engine);

    let mut first = agent.chat("Plan a trip").unwrap();
    let request = until_input(&mut first).await.pop().unwrap();
    agent.respond(request.id(), "Paris").unwrap();
    let tail = until_input(&mut first).await;
    assert_eq!(tail.last().unwrap().kind(), EventKind::Completed);

    // The finished stream is still held, the conversation is over regardless
    assert!(!agent.is_in_flight());
    assert!(!agent.cancel());

    let mut second = agent.chat("Plan another trip").unwrap();
    let request = until_input(&mut second).await.pop().unwrap();
    assert_eq!(request.kind(), EventKind::InputRequest);

    // Dropping the old stream must not touch the new conversation
    drop(first);
    assert!(agent.is_in_flight());
    assert_eq!(agent.pending_continuations(), vec![request.id().to_string()]);

    agent.respond(request.id(), "Rome").unwrap();
    let tail = until_input(&mut second).await;
    assert_eq!(tail[0].content(), "Rome");
    assert_eq!(tail.last().unwrap().kind(), EventKind::Completed);
}

#[tokio::test]
async fn test_error_event_frees_the_agent() {
    let agent = AgentCore::new(Arc::new(UnreachableEngine));

    let mut stream = agent.chat("Hello").unwrap();
    let event = stream.next().await.unwrap();
    assert_eq!(event.kind(), EventKind::Error);
    assert!(!agent.is_in_flight());

    assert!(agent.chat("Hello again").is_ok());
}
