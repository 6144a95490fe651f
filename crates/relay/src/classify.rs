//! Conversion of native engine notifications into `Event`s
//!
//! Every notification maps to exactly one outcome. Kinds we do not know become
//! plain messages that keep the native kind in their metadata, so newer engines
//! degrade instead of breaking the stream.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use crate::engine::{EngineError, InputHandle, NativeEvent, NativePayload};
use crate::models::event::{Event, EventKind, META_AGENT, META_EVENT_TYPE, META_PROMPT};

pub(crate) enum Classified {
    Emit(Event),
    /// An input request, together with the handle that must not leave the core
    Input { event: Event, handle: InputHandle },
    /// The engine reported a failure in band
    Failure(EngineError),
}

/// Map a native kind to the event kind it is reported as
pub fn kind_for(native_kind: &str) -> EventKind {
    match native_kind {
        "input_request" => EventKind::InputRequest,
        "text" | "agent_response" => EventKind::AgentResponse,
        "tool_call" | "function_call" | "execute_function" | "tool_response" => EventKind::ToolCall,
        "thinking" | "reasoning" => EventKind::Thinking,
        _ => EventKind::Message,
    }
}

/// Render a JSON value as display text
pub fn coerce_json(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn classify(native: NativeEvent, fallbacks: &AtomicU64) -> Classified {
    let NativeEvent {
        kind: native_kind,
        sender,
        payload,
    } = native;

    let content = match payload {
        NativePayload::Input(handle) => {
            // A handle is only answerable through the registry, whatever the kind says
            let prompt = handle.prompt().to_string();
            let mut event = Event::new(EventKind::InputRequest, prompt.clone())
                .with_metadata(META_PROMPT, prompt)
                .with_metadata(META_EVENT_TYPE, native_kind);
            if let Some(sender) = sender {
                event = event.with_metadata(META_AGENT, sender);
            }
            return Classified::Input { event, handle };
        }
        NativePayload::Empty => String::new(),
        NativePayload::Json(value) => coerce_json(&value),
        NativePayload::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    native_kind = native_kind.as_str(),
                    "native payload is not valid UTF-8, decoding lossily"
                );
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            }
        },
    };

    if native_kind == "error" {
        return Classified::Failure(EngineError::Other(content));
    }

    let kind = match kind_for(&native_kind) {
        // Without a handle there is nothing to answer
        EventKind::InputRequest => EventKind::Message,
        kind => kind,
    };

    let mut event = Event::new(kind, content).with_metadata(META_EVENT_TYPE, native_kind);
    if let Some(sender) = sender {
        event = event.with_metadata(META_AGENT, sender);
    }
    Classified::Emit(event)
}
