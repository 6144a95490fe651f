use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use crate::engine::InputHandle;
use crate::errors::{AgentError, AgentResult};

/// How a continuation left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Answered,
    Cancelled,
}

/// A conversation paused on an input request
///
/// Owns the native handle and the signal the paused conversation is waiting on.
#[derive(Debug)]
pub struct Continuation {
    handle: InputHandle,
    settle: oneshot::Sender<Settlement>,
}

impl Continuation {
    /// Wrap a native handle, returning the receiver the paused conversation awaits
    pub fn new(handle: InputHandle) -> (Self, oneshot::Receiver<Settlement>) {
        let (settle, settled) = oneshot::channel();
        (Continuation { handle, settle }, settled)
    }

    pub fn prompt(&self) -> &str {
        self.handle.prompt()
    }

    /// Hand the answer to the engine, then wake the conversation.
    /// Returns false if the engine had already stopped waiting.
    pub fn resolve<S: Into<String>>(self, answer: S) -> bool {
        let delivered = self.handle.respond(answer);
        let _ = self.settle.send(Settlement::Answered);
        delivered
    }

    pub fn cancel(self) {
        self.handle.cancel();
        let _ = self.settle.send(Settlement::Cancelled);
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    pending: HashMap<String, Continuation>,
    settled: HashSet<String>,
}

/// Pending continuations of one conversation, keyed by input request id
#[derive(Debug, Default)]
pub struct ContinuationRegistry {
    state: Mutex<RegistryState>,
}

impl ContinuationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register<S: Into<String>>(&self, id: S, continuation: Continuation) -> AgentResult<()> {
        let id = id.into();
        let mut state = self.state();
        if state.pending.contains_key(&id) || state.settled.contains(&id) {
            return Err(AgentError::DuplicateContinuation(id));
        }
        state.pending.insert(id, continuation);
        Ok(())
    }

    /// Remove and return a pending continuation
    pub fn take(&self, id: &str) -> AgentResult<Continuation> {
        let mut state = self.state();
        match state.pending.remove(id) {
            Some(continuation) => {
                state.settled.insert(id.to_string());
                Ok(continuation)
            }
            None if state.settled.contains(id) => Err(AgentError::double_answer(id)),
            None => Err(AgentError::unknown_continuation(id)),
        }
    }

    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state().pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.state().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every pending continuation as cancelled, returning how many there were
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(String, Continuation)> = {
            let mut state = self.state();
            let drained: Vec<_> = state.pending.drain().collect();
            for (id, _) in &drained {
                state.settled.insert(id.clone());
            }
            drained
        };

        let count = drained.len();
        for (_, continuation) in drained {
            continuation.cancel();
        }
        count
    }

    /// Forget everything, cancelling whatever is still pending
    pub fn clear(&self) {
        self.cancel_all();
        self.state().settled.clear();
    }
}
