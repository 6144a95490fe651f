use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct PendingResponse {
    session_id: String,
    started_at: DateTime<Utc>,
    in_flight: bool,
    pending: Vec<String>,
}

/// Which input requests of a live session are still waiting for an answer
async fn pending(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<PendingResponse>, ApiError> {
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| ApiError::SessionNotFound(session_id.clone()))?;

    Ok(Json(PendingResponse {
        session_id,
        started_at: session.started_at,
        in_flight: session.agent.is_in_flight(),
        pending: session.agent.pending_continuations(),
    }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/sessions/:session_id/pending", get(pending))
        .with_state(state)
}
