use crate::frames::{client_text, Frame};
use crate::sessions::{SessionEntry, SessionStore};
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use relay::models::event::{Event, EventKind};
use serde::Serialize;
use tracing::{info, warn};

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();
    drive(state, sender, receiver).await;
}

async fn send_json<S, T>(sender: &mut S, value: &T) -> bool
where
    S: Sink<Message> + Unpin,
    T: Serialize,
{
    match serde_json::to_string(value) {
        Ok(text) => sender.send(Message::Text(text)).await.is_ok(),
        Err(_) => false,
    }
}

/// The next text frame, or None once the client is gone
async fn next_text<R>(receiver: &mut R) -> Option<String>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => return Some(client_text(&text)),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

/// Run one conversation over a socket: the first text frame opens it, and each
/// input request is answered by the text frame that follows it
pub(crate) async fn drive<S, R>(state: AppState, mut sender: S, mut receiver: R)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let Some(opening) = next_text(&mut receiver).await else {
        return;
    };

    let agent = state.new_agent();
    let mut events = match agent.chat(&opening) {
        Ok(events) => events,
        Err(err) => {
            send_json(&mut sender, &Event::error(err.category(), err.to_string())).await;
            return;
        }
    };

    let session_id = SessionStore::new_id();
    state
        .sessions
        .insert(session_id.clone(), SessionEntry::socket(agent.clone()))
        .await;
    let live_sessions = state.sessions.len().await;
    info!(
        session_id = session_id.as_str(),
        live_sessions,
        "socket session opened"
    );

    let started = Frame::Started {
        session_id: session_id.clone(),
    };
    let mut connected = send_json(&mut sender, &started).await;

    while connected {
        let Some(event) = events.next().await else {
            break;
        };
        let pending = (event.kind() == EventKind::InputRequest)
            .then(|| (event.id().to_string(), event.prompt().to_string()));

        if !send_json(&mut sender, &event).await {
            connected = false;
            continue;
        }
        let Some((id, prompt)) = pending else {
            continue;
        };

        let marker = Frame::InputNeeded {
            id: id.clone(),
            prompt,
        };
        if !send_json(&mut sender, &marker).await {
            connected = false;
            continue;
        }

        match next_text(&mut receiver).await {
            Some(answer) => {
                if let Err(err) = agent.respond(&id, &answer) {
                    warn!(session_id = session_id.as_str(), error = %err, "answer not delivered");
                }
            }
            None => connected = false,
        }
    }

    if !connected {
        info!(session_id = session_id.as_str(), "client disconnected, cancelling");
        agent.cancel();
    }
    drop(events);
    state.sessions.remove(&session_id).await;
    let _ = sender.close().await;
    info!(session_id = session_id.as_str(), "socket session closed");
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(upgrade))
        .with_state(state)
}
