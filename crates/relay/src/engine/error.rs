use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Connection to engine failed: {0}")]
    Connection(String),

    #[error("Engine was rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid response from engine: {0}")]
    InvalidResponse(String),

    #[error("Engine run aborted: {0}")]
    Aborted(String),

    #[error("Engine error: {0}")]
    Other(String),
}

impl EngineError {
    /// Stable category reported to clients in the `error_type` metadata
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Connection(_) => "connection",
            EngineError::RateLimited(_) => "rate_limited",
            EngineError::InvalidResponse(_) => "invalid_response",
            EngineError::Aborted(_) => "aborted",
            EngineError::Other(_) => "engine_error",
        }
    }

    /// Inverse of `category`, unknown categories map to `Other`
    pub fn from_category<S: Into<String>>(category: &str, message: S) -> Self {
        let message = message.into();
        match category {
            "connection" => EngineError::Connection(message),
            "rate_limited" => EngineError::RateLimited(message),
            "invalid_response" => EngineError::InvalidResponse(message),
            "aborted" => EngineError::Aborted(message),
            _ => EngineError::Other(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for category in ["connection", "rate_limited", "invalid_response", "aborted", "engine_error"] {
            assert_eq!(EngineError::from_category(category, "x").category(), category);
        }
        assert_eq!(EngineError::from_category("quota", "x").category(), "engine_error");
    }
}
