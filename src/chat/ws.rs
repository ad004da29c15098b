//! WebSocket chat channel for the landing page widget.
//!
//! Clients join one or more sessions and only receive events for those
//! sessions. Bad frames produce an `error` frame; the socket stays open.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::manager::SessionManager;
use super::model::SessionEvent;

// ── JSON Protocol ───────────────────────────────────────────────────────

/// Frame from client → server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    JoinChat {
        session_id: Option<String>,
        user_id: Option<String>,
    },
    SendMessage {
        session_id: Option<String>,
        message: Option<String>,
    },
    Typing {
        session_id: Option<String>,
        user_id: Option<String>,
    },
}

/// Frame from server → client that is not a session event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    JoinedSession { session_id: Uuid, message: String },
    Error { message: String },
    /// Events were dropped; clients refetch these sessions over REST.
    Resync {
        missed: u64,
        session_ids: Vec<Uuid>,
        message: String,
    },
}

/// Build an Axum router with the `/ws/chat` endpoint.
pub fn chat_ws_routes(manager: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/ws/chat", get(ws_handler))
        .with_state(manager)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(manager): State<Arc<SessionManager>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, manager))
}

async fn handle_socket(mut socket: WebSocket, manager: Arc<SessionManager>) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "Chat WebSocket client connected");

    let mut joined: HashSet<Uuid> = HashSet::new();
    let mut rx = manager.subscribe();

    loop {
        tokio::select! {
            // Forward session events for joined sessions
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !joined.contains(&event.session_id()) {
                            continue;
                        }
                        if event.origin() == Some(connection_id) {
                            continue;
                        }
                        if !send_json(&mut socket, &event).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, connection_id = %connection_id, "Chat WS client lagged behind broadcast");
                        if let Some(frame) = resync_frame(n, &joined) {
                            if !send_json(&mut socket, &frame).await {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Session broadcast channel closed");
                        break;
                    }
                }
            }

            // Receive frames from client
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        let frames = handle_client_frame(&text, &manager, &mut joined, connection_id).await;
                        let mut closed = false;
                        for frame in frames {
                            if !send_json(&mut socket, &frame).await {
                                closed = true;
                                break;
                            }
                        }
                        if closed {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(connection_id = %connection_id, "Chat WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Chat WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Apply a client frame. Returns frames to send back to this client only.
async fn handle_client_frame(
    text: &str,
    manager: &SessionManager,
    joined: &mut HashSet<Uuid>,
    connection_id: Uuid,
) -> Vec<ServerFrame> {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized chat WS frame");
            return vec![error_frame("Unrecognized message")];
        }
    };

    match frame {
        ClientFrame::JoinChat {
            session_id,
            user_id,
        } => {
            let Some(session_id) = parse_session_id(session_id.as_deref()) else {
                return vec![error_frame("Session ID is required")];
            };
            if !manager.contains(session_id).await {
                return vec![error_frame("Session not found")];
            }
            joined.insert(session_id);
            info!(
                session_id = %session_id,
                user_id = user_id.as_deref().unwrap_or("anonymous"),
                "Client joined chat session"
            );
            vec![ServerFrame::JoinedSession {
                session_id,
                message: "Successfully joined chat session".into(),
            }]
        }
        ClientFrame::SendMessage {
            session_id,
            message,
        } => {
            let (Some(session_id), Some(message)) =
                (parse_session_id(session_id.as_deref()), message)
            else {
                return vec![error_frame("Message and session ID are required")];
            };
            // The reply arrives through the session broadcast, so only
            // sockets that joined the session see it.
            match manager.post_message(session_id, &message).await {
                Ok(_) => Vec::new(),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to process chat message");
                    vec![error_frame(&e.to_string())]
                }
            }
        }
        ClientFrame::Typing {
            session_id,
            user_id,
        } => {
            let Some(session_id) = parse_session_id(session_id.as_deref()) else {
                return vec![error_frame("Session ID is required")];
            };
            match manager
                .notify_typing(session_id, user_id, Some(connection_id))
                .await
            {
                Ok(()) => Vec::new(),
                Err(e) => vec![error_frame(&e.to_string())],
            }
        }
    }
}

fn parse_session_id(raw: Option<&str>) -> Option<Uuid> {
    raw.and_then(|s| Uuid::parse_str(s.trim()).ok())
}

fn error_frame(message: &str) -> ServerFrame {
    ServerFrame::Error {
        message: message.to_string(),
    }
}

/// Frame telling a lagged client which joined sessions may be stale.
fn resync_frame(missed: u64, joined: &HashSet<Uuid>) -> Option<ServerFrame> {
    if joined.is_empty() {
        return None;
    }
    let mut session_ids: Vec<Uuid> = joined.iter().copied().collect();
    session_ids.sort();
    Some(ServerFrame::Resync {
        missed,
        session_ids,
        message: format!("Missed {missed} events; reload the session"),
    })
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize chat WS frame");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::chat::manager::StartSession;

    async fn manager_with_session() -> (Arc<SessionManager>, Uuid) {
        let manager = SessionManager::new(&SessionConfig::default());
        let session = manager
            .start(StartSession {
                user_id: Some("ws_user".into()),
                user_info: None,
            })
            .await
            .unwrap();
        (manager, session.session_id)
    }

    #[tokio::test]
    async fn join_known_session() {
        let (manager, session_id) = manager_with_session().await;
        let mut joined = HashSet::new();
        let text = serde_json::json!({"type": "join_chat", "session_id": session_id}).to_string();

        let frames = handle_client_frame(&text, &manager, &mut joined, Uuid::new_v4()).await;
        assert!(matches!(
            frames.as_slice(),
            [ServerFrame::JoinedSession { session_id: id, .. }] if *id == session_id
        ));
        assert!(joined.contains(&session_id));
    }

    #[tokio::test]
    async fn join_without_session_id_is_error() {
        let (manager, _) = manager_with_session().await;
        let mut joined = HashSet::new();
        let frames =
            handle_client_frame(r#"{"type":"join_chat"}"#, &manager, &mut joined, Uuid::new_v4())
                .await;
        assert!(matches!(frames.as_slice(), [ServerFrame::Error { .. }]));
        assert!(joined.is_empty());
    }

    #[tokio::test]
    async fn send_without_message_is_error() {
        let (manager, session_id) = manager_with_session().await;
        let mut joined = HashSet::new();
        let text =
            serde_json::json!({"type": "send_message", "session_id": session_id}).to_string();
        let frames = handle_client_frame(&text, &manager, &mut joined, Uuid::new_v4()).await;
        match frames.as_slice() {
            [ServerFrame::Error { message }] => {
                assert_eq!(message, "Message and session ID are required")
            }
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_message_broadcasts_without_joining() {
        let (manager, session_id) = manager_with_session().await;
        let mut rx = manager.subscribe();
        let mut joined = HashSet::new();
        let text = serde_json::json!({
            "type": "send_message",
            "session_id": session_id,
            "message": "Is it free?"
        })
        .to_string();

        let frames = handle_client_frame(&text, &manager, &mut joined, Uuid::new_v4()).await;
        assert!(frames.is_empty());
        assert!(joined.is_empty());

        match rx.recv().await.unwrap() {
            SessionEvent::AiResponse {
                original_message, ..
            } => assert_eq!(original_message, "Is it free?"),
            other => panic!("expected ai_response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_send_does_not_join() {
        let (manager, session_id) = manager_with_session().await;
        manager.end(session_id).await.unwrap();
        let mut joined = HashSet::new();

        for target in [session_id, Uuid::new_v4()] {
            let text = serde_json::json!({
                "type": "send_message",
                "session_id": target,
                "message": "hello?"
            })
            .to_string();
            let frames = handle_client_frame(&text, &manager, &mut joined, Uuid::new_v4()).await;
            assert!(matches!(frames.as_slice(), [ServerFrame::Error { .. }]));
        }
        assert!(joined.is_empty());
    }

    #[tokio::test]
    async fn garbage_frame_is_error() {
        let (manager, _) = manager_with_session().await;
        let mut joined = HashSet::new();
        let frames = handle_client_frame("not json", &manager, &mut joined, Uuid::new_v4()).await;
        assert!(matches!(frames.as_slice(), [ServerFrame::Error { .. }]));
    }

    #[test]
    fn lag_resyncs_joined_sessions_only() {
        assert!(resync_frame(5, &HashSet::new()).is_none());

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let frame = resync_frame(5, &HashSet::from([a, b])).unwrap();
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "resync");
        assert_eq!(json["missed"], 5);
        assert_eq!(json["session_ids"].as_array().unwrap().len(), 2);
        assert_eq!(json["message"], "Missed 5 events; reload the session");
    }
}
