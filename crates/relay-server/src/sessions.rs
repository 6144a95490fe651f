//! Process-local table of live conversations
//!
//! A session pairs an agent core with whatever its transport needs between
//! requests. Streaming and socket sessions live as long as their connection;
//! request/response sessions park their undrained stream here and are swept
//! once they sit idle for too long.

use chrono::{DateTime, Utc};
use relay::agent::{AgentCore, EventStream};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Events pushed over server-sent events, answers posted to `/send_input`
    Streaming,
    /// Stream parked in the table between `/api/chat` and `/api/respond` calls
    Buffered,
    /// Driven over one socket, registered for diagnostics only
    Socket,
}

pub struct SessionEntry {
    pub agent: Arc<AgentCore>,
    pub kind: SessionKind,
    events: Mutex<Option<EventStream>>,
    last_touched: StdMutex<Instant>,
    pub started_at: DateTime<Utc>,
}

impl SessionEntry {
    fn new(agent: Arc<AgentCore>, kind: SessionKind, events: Option<EventStream>) -> Self {
        SessionEntry {
            agent,
            kind,
            events: Mutex::new(events),
            last_touched: StdMutex::new(Instant::now()),
            started_at: Utc::now(),
        }
    }

    pub fn streaming(agent: Arc<AgentCore>) -> Self {
        Self::new(agent, SessionKind::Streaming, None)
    }

    pub fn buffered(agent: Arc<AgentCore>, events: EventStream) -> Self {
        Self::new(agent, SessionKind::Buffered, Some(events))
    }

    pub fn socket(agent: Arc<AgentCore>) -> Self {
        Self::new(agent, SessionKind::Socket, None)
    }

    /// Exclusive access to the stored stream, held for as long as it is drained
    pub async fn events(&self) -> MutexGuard<'_, Option<EventStream>> {
        self.events.lock().await
    }

    /// Mark the session as used now
    pub fn touch(&self) {
        *self
            .last_touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<SessionEntry>>>>,
}

impl SessionStore {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub async fn insert(&self, id: String, entry: SessionEntry) -> Arc<SessionEntry> {
        let entry = Arc::new(entry);
        self.sessions.write().await.insert(id, entry.clone());
        entry
    }

    pub async fn get(&self, id: &str) -> Option<Arc<SessionEntry>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<SessionEntry>> {
        self.sessions.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Cancel and drop buffered sessions untouched for longer than `max_idle`.
    /// Connected sessions are left to their connection.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let expired: Vec<(String, Arc<SessionEntry>)> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, entry)| {
                    entry.kind == SessionKind::Buffered && entry.idle_for() > max_idle
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        for (id, entry) in &expired {
            entry.agent.cancel();
            info!(session_id = id.as_str(), "idle session expired");
        }
        expired.len()
    }

    /// Sweep idle sessions every `period` until the task is aborted
    pub fn spawn_sweeper(&self, max_idle: Duration, period: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                store.sweep_idle(max_idle).await;
            }
        })
    }
}
