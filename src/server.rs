use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::error::GameError;
use crate::questions::CatalogProvider;
use crate::registry::Registry;
use crate::session::{SessionEvent, SessionHandle};
use crate::types::{ClientMsg, GameRules, ServerMsg};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub provider: Arc<CatalogProvider>,
    pub rules: GameRules,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves until the process is stopped.
pub async fn run(state: AppState, port: u16) {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind");

    tracing::info!("quizhive server running on port {}", port);

    axum::serve(listener, app).await.unwrap();
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));

    let connection_id = uuid::Uuid::new_v4().to_string();
    tracing::info!("WebSocket connected: {}", connection_id);

    // The session this socket participates in, once joined.
    let current_session: Arc<Mutex<Option<SessionHandle>>> = Arc::new(Mutex::new(None));

    // Forward session events to this socket.
    let sender_clone = sender.clone();
    let connection_id_clone = connection_id.clone();
    let current_session_clone = current_session.clone();

    let event_task = tokio::spawn(async move {
        loop {
            let handle = {
                let guard = current_session_clone.lock().await;
                guard.clone()
            };

            let Some(handle) = handle else {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                continue;
            };

            let mut event_rx = handle.subscribe();

            loop {
                match event_rx.recv().await {
                    Ok(event) => {
                        let msg = match &event {
                            SessionEvent::SendTo { connection_id, msg } => {
                                if *connection_id != connection_id_clone {
                                    continue;
                                }
                                msg
                            }
                            SessionEvent::Broadcast { msg } => msg,
                        };

                        if let Ok(json) = serde_json::to_string(msg) {
                            let mut s = sender_clone.lock().await;
                            if s.send(Message::Text(json.into())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        // Session ended; wait for a potential new game.
                        break;
                    }
                }
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };

        let client_msg: ClientMsg = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid message: {}", e);
                continue;
            }
        };

        match client_msg {
            ClientMsg::CreateGame {
                gamertag,
                room_code,
                game_properties,
            } => {
                let count = game_properties
                    .question_count
                    .unwrap_or(state.rules.default_question_count);
                let pending = state
                    .provider
                    .question_set(&game_properties.categories, count);

                let questions = match pending.resolve().await {
                    Ok(q) => q,
                    Err(e) => {
                        send_error(&sender, &GameError::Provider(e)).await;
                        continue;
                    }
                };

                let handle = match state.registry.create_session(
                    room_code,
                    questions,
                    state.rules.clone(),
                ) {
                    Ok(h) => h,
                    Err(e) => {
                        send_error(&sender, &e).await;
                        continue;
                    }
                };

                if let Err(e) =
                    attach_session(&current_session, handle.clone(), &connection_id, gamertag)
                        .await
                {
                    send_error(&sender, &e).await;
                    continue;
                }

                match handle.snapshot().await {
                    Ok(session) => {
                        send_msg(&sender, &ServerMsg::GameCreated { session }).await;
                    }
                    Err(e) => send_error(&sender, &e).await,
                }
            }

            ClientMsg::JoinGame { room_code, gamertag } => {
                let Some(handle) = state.registry.lookup_by_room_code(&room_code) else {
                    send_error(&sender, &GameError::RoomNotFound(room_code)).await;
                    continue;
                };

                if let Err(e) =
                    attach_session(&current_session, handle, &connection_id, gamertag).await
                {
                    send_error(&sender, &e).await;
                }
            }

            ClientMsg::SubmitAnswer { question_id, answer } => {
                let handle = current_session.lock().await.clone();
                if let Some(handle) = handle {
                    let _ = handle
                        .submit_answer(connection_id.clone(), question_id, answer)
                        .await;
                }
            }

            ClientMsg::SetReady => {
                let handle = current_session.lock().await.clone();
                if let Some(handle) = handle {
                    let _ = handle.set_ready(connection_id.clone()).await;
                }
            }

            ClientMsg::GetTimer => {
                // Reply comes back through the event forwarder, addressed
                // to this connection only.
                let handle = current_session.lock().await.clone();
                if let Some(handle) = handle {
                    let _ = handle.get_timer(connection_id.clone()).await;
                }
            }
        }
    }

    tracing::info!("WebSocket disconnected: {}", connection_id);
    event_task.abort();
}

/// Joins the session, and only then makes it the socket's current one.
/// A rejected join leaves any previously attached session in place.
async fn attach_session(
    current: &Mutex<Option<SessionHandle>>,
    handle: SessionHandle,
    connection_id: &str,
    gamertag: String,
) -> Result<(), GameError> {
    handle.join(connection_id.to_string(), gamertag).await?;
    *current.lock().await = Some(handle);
    Ok(())
}

async fn send_msg(sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>, msg: &ServerMsg) {
    if let Ok(json) = serde_json::to_string(msg) {
        let mut s = sender.lock().await;
        let _ = s.send(Message::Text(json.into())).await;
    }
}

async fn send_error(sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>, err: &GameError) {
    send_msg(sender, &ServerMsg::Error {
        kind: err.kind().to_string(),
        message: err.to_string(),
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_join_keeps_the_previous_session_attached() {
        let registry = Registry::new();
        let a = registry
            .create_session(Some("AAAA".into()), Vec::new(), GameRules::default())
            .unwrap();
        let b = registry
            .create_session(Some("BBBB".into()), Vec::new(), GameRules::default())
            .unwrap();

        let current = Mutex::new(None);
        attach_session(&current, a.clone(), "c1", "ada".into())
            .await
            .unwrap();

        // Occupy the tag in the other room so the second attach is rejected.
        b.join("c2".into(), "grace".into()).await.unwrap();
        let err = attach_session(&current, b, "c1", "grace".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "duplicate-tag");

        let attached = current.lock().await.clone().unwrap();
        assert_eq!(attached.id, a.id);
    }
}
