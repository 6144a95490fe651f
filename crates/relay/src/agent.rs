use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::classify::{classify, Classified};
use crate::engine::{Engine, EngineError, RunRequest};
use crate::errors::{AgentError, AgentResult};
use crate::models::event::{Event, EventKind, META_AGENT};
use crate::models::session::{FileRecord, Session, Turn};
use crate::registry::{Continuation, ContinuationRegistry, Settlement};

/// The events of one conversation, ending with exactly one terminal event
pub type EventStream = BoxStream<'static, Event>;

/// Everything a transport can ask of an agent
#[async_trait]
pub trait Agent: Send + Sync {
    async fn list_files(&self) -> Vec<FileRecord>;
    async fn upload_file(&self, path: &str) -> FileRecord;
    /// Returns false if no file with that id was uploaded
    async fn delete_file(&self, id: &str) -> bool;
    /// Drop all session state, cancelling any conversation in flight
    async fn reset(&self);

    async fn load_history(&self, turns: Vec<Turn>);
    async fn unload_history(&self);

    /// Merge the given variables into the context
    async fn set_context(&self, variables: Map<String, Value>);
    async fn get_context(&self, name: &str) -> Option<Value>;
    async fn delete_context(&self, name: &str) -> bool;

    async fn chat(&self, message: &str) -> AgentResult<EventStream>;
    async fn chat_with(&self, agent: &str, message: &str) -> AgentResult<EventStream>;
    async fn respond(&self, id: &str, answer: &str) -> AgentResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    /// Upper bound on engine rounds per conversation, 0 for no bound
    pub max_rounds: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig { max_rounds: 15 }
    }
}

/// AgentCore bridges an engine run to a stream of events, pausing the stream
/// whenever the engine waits on a human and resuming it from `respond`
pub struct AgentCore {
    engine: Arc<dyn Engine>,
    config: AgentConfig,
    session: Arc<Mutex<Session>>,
    registry: Arc<ContinuationRegistry>,
    in_flight: Arc<AtomicBool>,
    cancel_tx: Arc<Mutex<Option<watch::Sender<bool>>>>,
    fallbacks: Arc<AtomicU64>,
}

/// Holds the conversation slot. Released when the terminal event is emitted,
/// or when the stream is dropped before reaching it.
struct ConversationGuard {
    in_flight: Arc<AtomicBool>,
    registry: Arc<ContinuationRegistry>,
    cancel_tx: Arc<Mutex<Option<watch::Sender<bool>>>>,
    released: bool,
}

impl ConversationGuard {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.registry.cancel_all();
        lock(&self.cancel_tx).take();
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        self.release();
    }
}

enum Wake<T> {
    Ready(T),
    Cancelled,
}

async fn wait_for_cancel(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow_and_update() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            // The core is gone, nobody can cancel anymore
            std::future::pending::<()>().await;
        }
    }
}

async fn or_cancelled<F: Future>(cancel_rx: &mut watch::Receiver<bool>, fut: F) -> Wake<F::Output> {
    tokio::select! {
        biased;
        _ = wait_for_cancel(cancel_rx) => Wake::Cancelled,
        output = fut => Wake::Ready(output),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn failure(err: EngineError) -> Event {
    error!(category = err.category(), error = %err, "engine failed");
    Event::error(err.category(), err.to_string())
}

impl AgentCore {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self::with_config(engine, AgentConfig::default())
    }

    pub fn with_config(engine: Arc<dyn Engine>, config: AgentConfig) -> Self {
        AgentCore {
            engine,
            config,
            session: Arc::new(Mutex::new(Session::new())),
            registry: Arc::new(ContinuationRegistry::new()),
            in_flight: Arc::new(AtomicBool::new(false)),
            cancel_tx: Arc::new(Mutex::new(None)),
            fallbacks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start a conversation
    pub fn chat(&self, message: &str) -> AgentResult<EventStream> {
        self.start(message.to_string(), None)
    }

    /// Start a conversation with the named agent taking the first turn
    pub fn chat_with(&self, agent: &str, message: &str) -> AgentResult<EventStream> {
        self.start(message.to_string(), Some(agent.to_string()))
    }

    /// Answer a pending input request. Returns as soon as the answer is handed
    /// over, the paused stream picks it up on its next poll.
    pub fn respond(&self, id: &str, answer: &str) -> AgentResult<()> {
        let continuation = self.registry.take(id).map_err(|err| {
            warn!(id, error = %err, "rejected answer");
            err
        })?;

        lock(&self.session).history.push(Turn::user(answer));
        if !continuation.resolve(answer) {
            warn!(id, "engine stopped waiting before the answer arrived");
        }
        debug!(id, "answer delivered");
        Ok(())
    }

    /// Stop the conversation in flight. Returns false if there was nothing to stop.
    pub fn cancel(&self) -> bool {
        let signalled = lock(&self.cancel_tx)
            .as_ref()
            .map(|tx| tx.send(true).is_ok())
            .unwrap_or(false);
        let released = self.registry.cancel_all();
        if signalled || released > 0 {
            info!(released, "conversation cancelled");
        }
        signalled || released > 0
    }

    /// Ids of the input requests currently waiting for an answer
    pub fn pending_continuations(&self) -> Vec<String> {
        self.registry.pending_ids()
    }

    /// How many native payloads had to be decoded lossily
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn start(&self, message: String, target_agent: Option<String>) -> AgentResult<EventStream> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(AgentError::ConversationInFlight);
        }
        let mut guard = ConversationGuard {
            in_flight: self.in_flight.clone(),
            registry: self.registry.clone(),
            cancel_tx: self.cancel_tx.clone(),
            released: false,
        };

        self.registry.clear();
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        *lock(&self.cancel_tx) = Some(cancel_tx);

        let engine = self.engine.clone();
        let session = self.session.clone();
        let registry = self.registry.clone();
        let fallbacks = self.fallbacks.clone();
        let request = prepare_run(&session, message, target_agent, self.config.max_rounds);

        Ok(Box::pin(async_stream::stream! {
            info!(
                engine = engine.name(),
                target_agent = request.target_agent.as_deref(),
                "conversation started"
            );

            let terminal = 'conversation: {
                let mut native = match or_cancelled(&mut cancel_rx, engine.run(request)).await {
                    Wake::Cancelled => break 'conversation Event::cancelled(),
                    Wake::Ready(Err(err)) => break 'conversation failure(err),
                    Wake::Ready(Ok(native)) => native,
                };

                loop {
                    let next = match or_cancelled(&mut cancel_rx, native.next()).await {
                        Wake::Cancelled => break 'conversation Event::cancelled(),
                        Wake::Ready(None) => break 'conversation Event::completed(snapshot(&session)),
                        Wake::Ready(Some(Err(err))) => break 'conversation failure(err),
                        Wake::Ready(Some(Ok(next))) => next,
                    };

                    match classify(next, &fallbacks) {
                        Classified::Emit(event) => {
                            record_response(&session, &event);
                            debug!(kind = %event.kind(), id = event.id(), "event");
                            yield event;
                        }
                        Classified::Input { event, handle } => {
                            let (continuation, settled) = Continuation::new(handle);
                            if let Err(err) = registry.register(event.id(), continuation) {
                                break 'conversation Event::error(err.category(), err.to_string());
                            }
                            debug!(id = event.id(), "awaiting input");
                            yield event;

                            match or_cancelled(&mut cancel_rx, settled).await {
                                Wake::Ready(Ok(Settlement::Answered)) => {}
                                Wake::Ready(Ok(Settlement::Cancelled)) | Wake::Ready(Err(_)) | Wake::Cancelled => {
                                    break 'conversation Event::cancelled();
                                }
                            }
                        }
                        Classified::Failure(err) => break 'conversation failure(err),
                    }
                }
            };

            // The slot is free before the caller sees the terminal event
            guard.release();
            info!(outcome = %terminal.kind(), "conversation finished");
            yield terminal;
        }))
    }
}

fn prepare_run(
    session: &Mutex<Session>,
    message: String,
    target_agent: Option<String>,
    max_rounds: usize,
) -> RunRequest {
    let mut session = lock(session);
    session.next_step();
    let history = session.history.clone();
    session.history.push(Turn::user(message.clone()));
    RunRequest {
        message,
        context: session.context.clone(),
        history,
        target_agent,
        max_rounds,
    }
}

fn record_response(session: &Mutex<Session>, event: &Event) {
    if event.kind() != EventKind::AgentResponse {
        return;
    }
    let role = event.metadata_str(META_AGENT).unwrap_or("assistant").to_string();
    lock(session)
        .history
        .push(Turn::new(role, event.content()));
}

fn snapshot(session: &Mutex<Session>) -> Map<String, Value> {
    lock(session).context.clone()
}

#[async_trait]
impl Agent for AgentCore {
    async fn list_files(&self) -> Vec<FileRecord> {
        lock(&self.session).files.clone()
    }

    async fn upload_file(&self, path: &str) -> FileRecord {
        let record = FileRecord::from_path(path);
        lock(&self.session).files.push(record.clone());
        record
    }

    async fn delete_file(&self, id: &str) -> bool {
        let mut session = lock(&self.session);
        let before = session.files.len();
        session.files.retain(|file| file.id != id);
        session.files.len() != before
    }

    async fn reset(&self) {
        self.cancel();
        *lock(&self.session) = Session::new();
    }

    async fn load_history(&self, turns: Vec<Turn>) {
        lock(&self.session).history = turns;
    }

    async fn unload_history(&self) {
        lock(&self.session).history.clear();
    }

    async fn set_context(&self, variables: Map<String, Value>) {
        lock(&self.session).context.extend(variables);
    }

    async fn get_context(&self, name: &str) -> Option<Value> {
        lock(&self.session).context.get(name).cloned()
    }

    async fn delete_context(&self, name: &str) -> bool {
        lock(&self.session).context.remove(name).is_some()
    }

    async fn chat(&self, message: &str) -> AgentResult<EventStream> {
        AgentCore::chat(self, message)
    }

    async fn chat_with(&self, agent: &str, message: &str) -> AgentResult<EventStream> {
        AgentCore::chat_with(self, agent, message)
    }

    async fn respond(&self, id: &str, answer: &str) -> AgentResult<()> {
        AgentCore::respond(self, id, answer)
    }
}
