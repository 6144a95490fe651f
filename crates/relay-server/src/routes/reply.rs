use crate::error::ApiError;
use crate::sessions::{SessionEntry, SessionStore};
use crate::state::AppState;
use axum::{extract::State, routing::post, Json, Router};
use futures::stream::StreamExt;
use relay::agent::EventStream;
use relay::models::event::{Event, EventKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RespondRequest {
    session_id: String,
    event_id: String,
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    InputRequired,
    Completed,
    Error,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub status: Status,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub events: Vec<Event>,
}

/// Where draining stopped
#[derive(Debug, PartialEq)]
enum Stop {
    Input { event_id: String, prompt: String },
    Finished(Status),
}

/// Collect events until the first input request or the end of the conversation
async fn drain(stream: &mut EventStream, events: &mut Vec<Event>) -> Stop {
    while let Some(event) = stream.next().await {
        let stop = match event.kind() {
            EventKind::InputRequest => Some(Stop::Input {
                event_id: event.id().to_string(),
                prompt: event.prompt().to_string(),
            }),
            EventKind::Completed => Some(Stop::Finished(Status::Completed)),
            EventKind::Error => Some(Stop::Finished(Status::Error)),
            _ => None,
        };
        events.push(event);
        if let Some(stop) = stop {
            return stop;
        }
    }
    // A stream never ends without a terminal event, unless it was already drained
    Stop::Finished(Status::Error)
}

fn response(session_id: String, stop: Stop, events: Vec<Event>) -> ChatResponse {
    match stop {
        Stop::Input { event_id, prompt } => ChatResponse {
            status: Status::InputRequired,
            session_id,
            event_id: Some(event_id),
            prompt: Some(prompt),
            events,
        },
        Stop::Finished(status) => ChatResponse {
            status,
            session_id,
            event_id: None,
            prompt: None,
            events,
        },
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let agent = state.new_agent();
    let mut stream = agent.chat(&request.message)?;
    let session_id = SessionStore::new_id();

    let mut events = Vec::new();
    let stop = drain(&mut stream, &mut events).await;
    debug!(session_id = session_id.as_str(), ?stop, "first drain finished");

    if matches!(stop, Stop::Input { .. }) {
        state
            .sessions
            .insert(session_id.clone(), SessionEntry::buffered(agent, stream))
            .await;
        info!(session_id = session_id.as_str(), "session waiting for input");
    }

    Ok(Json(response(session_id, stop, events)))
}

async fn respond_handler(
    State(state): State<AppState>,
    Json(request): Json<RespondRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session = state
        .sessions
        .get(&request.session_id)
        .await
        .ok_or_else(|| ApiError::SessionNotFound(request.session_id.clone()))?;
    session.touch();

    let mut guard = session.events().await;
    let stream = guard
        .as_mut()
        .ok_or_else(|| ApiError::SessionClosed(request.session_id.clone()))?;

    session.agent.respond(&request.event_id, &request.message)?;

    let mut events = Vec::new();
    let stop = drain(stream, &mut events).await;
    if let Stop::Finished(status) = stop {
        guard.take();
        state.sessions.remove(&request.session_id).await;
        info!(session_id = request.session_id.as_str(), ?status, "session finished");
    }

    Ok(Json(response(request.session_id, stop, events)))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/respond", post(respond_handler))
        .with_state(state)
}
