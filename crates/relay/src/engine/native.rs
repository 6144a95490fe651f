use serde_json::Value;
use tokio::sync::oneshot;

/// How a pending input request was resolved
#[derive(Debug, Clone, PartialEq)]
pub enum InputReply {
    Answer(String),
    Cancelled,
}

/// The engine's side of a request for human input
///
/// The handle is consumed by `respond` or `cancel`, so it resolves at most once.
/// Dropping it unresolved closes the engine's receiver, which the engine sees as
/// an abandoned request.
#[derive(Debug)]
pub struct InputHandle {
    prompt: String,
    tx: oneshot::Sender<InputReply>,
}

impl InputHandle {
    /// Create a handle and the receiver the engine waits on
    pub fn new<S: Into<String>>(prompt: S) -> (Self, oneshot::Receiver<InputReply>) {
        let (tx, rx) = oneshot::channel();
        (
            InputHandle {
                prompt: prompt.into(),
                tx,
            },
            rx,
        )
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Deliver the answer. Returns false if the engine stopped waiting.
    pub fn respond<S: Into<String>>(self, answer: S) -> bool {
        self.tx.send(InputReply::Answer(answer.into())).is_ok()
    }

    pub fn cancel(self) -> bool {
        self.tx.send(InputReply::Cancelled).is_ok()
    }
}

/// The payload of a native notification
#[derive(Debug)]
pub enum NativePayload {
    Empty,
    Json(Value),
    Bytes(Vec<u8>),
    Input(InputHandle),
}

/// A notification as the engine reports it, before classification
#[derive(Debug)]
pub struct NativeEvent {
    pub kind: String,
    pub sender: Option<String>,
    pub payload: NativePayload,
}

impl NativeEvent {
    pub fn new<S: Into<String>>(kind: S, payload: NativePayload) -> Self {
        NativeEvent {
            kind: kind.into(),
            sender: None,
            payload,
        }
    }

    pub fn with_sender<S: Into<String>>(mut self, sender: S) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// A text message spoken by an agent
    pub fn text<A: Into<String>, S: Into<String>>(sender: A, text: S) -> Self {
        NativeEvent::new("text", NativePayload::Json(Value::String(text.into()))).with_sender(sender)
    }

    pub fn input_request(handle: InputHandle) -> Self {
        NativeEvent::new("input_request", NativePayload::Input(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_delivers_answer() {
        let (handle, rx) = InputHandle::new("pick a city");
        assert_eq!(handle.prompt(), "pick a city");
        assert!(handle.respond("Paris"));
        assert_eq!(rx.await.unwrap(), InputReply::Answer("Paris".to_string()));
    }

    #[tokio::test]
    async fn test_handle_reports_abandoned_receiver() {
        let (handle, rx) = InputHandle::new("anyone there?");
        drop(rx);
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn test_dropped_handle_closes_receiver() {
        let (handle, rx) = InputHandle::new("never answered");
        drop(handle);
        assert!(rx.await.is_err());
    }
}
