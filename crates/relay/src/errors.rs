use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// `respond` was called with an id that is not pending. `answered` is set when the id
    /// was settled earlier in the same conversation, which points at a double answer.
    #[error("{}", unknown_continuation_message(.id, .answered))]
    UnknownContinuation { id: String, answered: bool },

    #[error("Continuation already registered: {0}")]
    DuplicateContinuation(String),

    #[error("A conversation is already in flight on this agent")]
    ConversationInFlight,
}

impl AgentError {
    pub fn unknown_continuation<S: Into<String>>(id: S) -> Self {
        AgentError::UnknownContinuation {
            id: id.into(),
            answered: false,
        }
    }

    pub fn double_answer<S: Into<String>>(id: S) -> Self {
        AgentError::UnknownContinuation {
            id: id.into(),
            answered: true,
        }
    }

    pub fn is_unknown_continuation(&self) -> bool {
        matches!(self, AgentError::UnknownContinuation { .. })
    }

    /// Stable name carried as `error_type` when this error ends a conversation
    pub fn category(&self) -> &'static str {
        match self {
            AgentError::UnknownContinuation {
                answered: false, ..
            } => "unknown_continuation",
            AgentError::UnknownContinuation { answered: true, .. } => "double_answer",
            AgentError::DuplicateContinuation(_) => "duplicate_continuation",
            AgentError::ConversationInFlight => "conversation_in_flight",
        }
    }
}

fn unknown_continuation_message(id: &str, answered: &bool) -> String {
    if *answered {
        format!("Input request {} was already answered", id)
    } else {
        format!("No pending input request with id {}", id)
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_answer_is_unknown_continuation() {
        let err = AgentError::double_answer("r1");
        assert!(err.is_unknown_continuation());
        assert_eq!(err.to_string(), "Input request r1 was already answered");

        let err = AgentError::unknown_continuation("nope");
        assert_eq!(err.to_string(), "No pending input request with id nope");
    }

    #[test]
    fn test_categories() {
        assert_eq!(AgentError::double_answer("r1").category(), "double_answer");
        assert_eq!(
            AgentError::unknown_continuation("r1").category(),
            "unknown_continuation"
        );
        assert_eq!(
            AgentError::DuplicateContinuation("r1".to_string()).category(),
            "duplicate_continuation"
        );
        assert_eq!(
            AgentError::ConversationInFlight.category(),
            "conversation_in_flight"
        );
    }
}
