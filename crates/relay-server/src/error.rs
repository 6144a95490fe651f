use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay::errors::AgentError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a dotted settings path to the environment variable that sets it
pub fn to_env_var(field_path: &str) -> String {
    format!("RELAY_{}", field_path.replace('.', "__").to_uppercase())
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Session {0} is not accepting input")]
    SessionClosed(String),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SessionClosed(_) => StatusCode::CONFLICT,
            ApiError::Agent(AgentError::UnknownContinuation { answered: false, .. }) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Agent(AgentError::UnknownContinuation { answered: true, .. })
            | ApiError::Agent(AgentError::ConversationInFlight) => StatusCode::CONFLICT,
            ApiError::Agent(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
