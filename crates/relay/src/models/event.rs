use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Open metadata attached to every event
pub type Metadata = Map<String, Value>;

/// Metadata key holding the name of the agent that produced the event
pub const META_AGENT: &str = "agent";
/// Metadata key holding the human readable prompt of an input request
pub const META_PROMPT: &str = "prompt";
/// Metadata key holding the unconverted native notification kind
pub const META_EVENT_TYPE: &str = "event_type";
/// Metadata key holding the failure category of an error event
pub const META_ERROR_TYPE: &str = "error_type";
/// Metadata key holding the context snapshot of a completed conversation
pub const META_FINAL_CONTEXT: &str = "final_context";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
/// The kinds of activity an agent can report
pub enum EventKind {
    Message,
    InputRequest,
    AgentResponse,
    ToolCall,
    Thinking,
    Error,
    Completed,
}

impl EventKind {
    /// Terminal kinds end a conversation, nothing is emitted after them
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Error | EventKind::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One unit of agent activity, already reduced to display text
pub struct Event {
    kind: EventKind,
    id: String,
    content: String,
    #[serde(default)]
    metadata: Metadata,
}

impl Event {
    /// Create an event with a freshly generated id
    pub fn new<S: Into<String>>(kind: EventKind, content: S) -> Self {
        Self::with_id(kind, Uuid::new_v4().to_string(), content)
    }

    pub fn with_id<I: Into<String>, S: Into<String>>(kind: EventKind, id: I, content: S) -> Self {
        Event {
            kind,
            id: id.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata entry while the event is being built
    pub fn with_metadata<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn completed(final_context: Map<String, Value>) -> Self {
        Event::new(EventKind::Completed, "Chat completed successfully")
            .with_metadata(META_FINAL_CONTEXT, Value::Object(final_context))
    }

    pub fn error<C: Into<String>, S: Into<String>>(category: C, description: S) -> Self {
        Event::new(EventKind::Error, description).with_metadata(META_ERROR_TYPE, category.into())
    }

    pub fn cancelled() -> Self {
        Event::error("cancelled", "Conversation was cancelled")
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Read a string metadata entry
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// The prompt of an input request, falling back to the content
    pub fn prompt(&self) -> &str {
        self.metadata_str(META_PROMPT).unwrap_or(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_payload_shape() {
        let event = Event::with_id(EventKind::InputRequest, "r1", "pick a city")
            .with_metadata(META_PROMPT, "pick a city");

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "input_request",
                "id": "r1",
                "content": "pick a city",
                "metadata": {"prompt": "pick a city"}
            })
        );
    }

    #[test]
    fn test_metadata_defaults_to_empty() {
        let event: Event =
            serde_json::from_str(r#"{"kind":"message","id":"1","content":"hi"}"#).unwrap();
        assert!(event.metadata().is_empty());
        assert_eq!(event.kind(), EventKind::Message);
    }

    #[test]
    fn test_kind_names_match_wire_names() {
        for kind in EventKind::iter() {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire, json!(kind.to_string()));
            assert_eq!(EventKind::from_str(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn test_only_error_and_completed_are_terminal() {
        let terminal: Vec<EventKind> = EventKind::iter().filter(|k| k.is_terminal()).collect();
        assert_eq!(terminal, vec![EventKind::Error, EventKind::Completed]);
    }

    #[test]
    fn test_error_carries_category() {
        let event = Event::error("rate_limited", "slow down");
        assert_eq!(event.metadata_str(META_ERROR_TYPE), Some("rate_limited"));
        assert_eq!(event.content(), "slow down");
        assert!(event.is_terminal());
    }

    #[test]
    fn test_prompt_falls_back_to_content() {
        let event = Event::new(EventKind::InputRequest, "Please provide input:");
        assert_eq!(event.prompt(), "Please provide input:");
    }
}
