use crate::error::ApiError;
use crate::frames::{sse_data, Frame};
use crate::sessions::{SessionEntry, SessionKind, SessionStore};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use relay::models::event::EventKind;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[serde(default = "default_role")]
    role: String,
    content: String,
}

fn default_role() -> String {
    "user".to_string()
}

/// An answer addressed to one input request of a streaming session
#[derive(Debug, Deserialize)]
struct SendInputRequest {
    session_id: String,
    id: String,
    message: String,
}

/// Server-sent events fed from a channel
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let body = Body::from_stream(self);
        (
            [
                (CONTENT_TYPE, "text/event-stream"),
                (CACHE_CONTROL, "no-cache"),
                (CONNECTION, "keep-alive"),
            ],
            body,
        )
            .into_response()
    }
}

/// The conversation opens with the most recent user message
fn opening_message(messages: Vec<IncomingMessage>) -> Option<String> {
    messages
        .into_iter()
        .rev()
        .find(|message| message.role == "user")
        .map(|message| message.content)
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<SseResponse, ApiError> {
    let message = opening_message(request.messages)
        .ok_or_else(|| ApiError::BadRequest("No user message to start from".to_string()))?;

    let agent = state.new_agent();
    let mut events = agent.chat(&message)?;

    let (tx, rx) = mpsc::channel(100);
    let session_id = SessionStore::new_id();
    state
        .sessions
        .insert(session_id.clone(), SessionEntry::streaming(agent.clone()))
        .await;
    let live_sessions = state.sessions.len().await;
    info!(
        session_id = session_id.as_str(),
        live_sessions,
        "streaming session opened"
    );

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let started = Frame::Started {
            session_id: session_id.clone(),
        };
        if tx.send(sse_data(&started)).await.is_err() {
            agent.cancel();
            sessions.remove(&session_id).await;
            return;
        }

        loop {
            // A paused stream only wakes on an answer, watch the client meanwhile
            let next = tokio::select! {
                next = events.next() => next,
                _ = tx.closed() => {
                    info!(session_id = session_id.as_str(), "client went away, cancelling");
                    agent.cancel();
                    break;
                }
            };
            let Some(event) = next else {
                break;
            };
            let pending = (event.kind() == EventKind::InputRequest)
                .then(|| (event.id().to_string(), event.prompt().to_string()));

            if let Err(e) = tx.send(sse_data(&event)).await {
                tracing::error!("Error sending event through channel: {}", e);
                agent.cancel();
                break;
            }

            if let Some((id, prompt)) = pending {
                let marker = Frame::WaitingForInput { id, prompt };
                if tx.send(sse_data(&marker)).await.is_err() {
                    agent.cancel();
                    break;
                }
            }
        }

        drop(events);
        sessions.remove(&session_id).await;
        info!(session_id = session_id.as_str(), "streaming session closed");
    });

    Ok(SseResponse::new(ReceiverStream::new(rx)))
}

/// Answer the input request `id` of a streaming session. Repeated or stale ids
/// are refused with the core's continuation error.
async fn send_input(
    State(state): State<AppState>,
    Json(request): Json<SendInputRequest>,
) -> Result<Json<Value>, ApiError> {
    let session = state
        .sessions
        .get(&request.session_id)
        .await
        .ok_or_else(|| ApiError::SessionNotFound(request.session_id.clone()))?;

    if session.kind != SessionKind::Streaming {
        return Err(ApiError::BadRequest(format!(
            "Session {} does not take answers on /send_input",
            request.session_id
        )));
    }
    session.agent.respond(&request.id, &request.message)?;

    Ok(Json(json!({ "status": "sent" })))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handler))
        .route("/send_input", post(send_input))
        .with_state(state)
}
