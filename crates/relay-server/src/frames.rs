use serde::{Deserialize, Serialize};

/// Transport markers sent alongside events. Markers carry a `type` key, events
/// carry `kind`, so a client can always tell them apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Started { session_id: String },
    /// The stream is paused until `/send_input` answers this id
    WaitingForInput { id: String, prompt: String },
    /// The next text frame on the socket is taken as the answer
    InputNeeded { id: String, prompt: String },
}

/// Encode a value as one server-sent event
pub fn sse_data<T: Serialize>(value: &T) -> String {
    let encoded = serde_json::to_string(value).unwrap_or_else(|_| String::new());
    format!("data: {}\n\n", encoded)
}

/// A text frame from a client: either bare text or `{"message": ...}`
pub fn client_text(frame: &str) -> String {
    #[derive(Deserialize)]
    struct Wrapped {
        message: String,
    }

    match serde_json::from_str::<Wrapped>(frame) {
        Ok(wrapped) => wrapped.message,
        Err(_) => frame.to_string(),
    }
}
