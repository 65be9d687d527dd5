use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::connection::ConnectionHandle;
use crate::infrastructure::auth::Principal;
use crate::server::AppState;
use crate::session::{MediaKind, SignalKind};

use super::message::{ClientMessage, ServerMessage};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let token = match extract_token(&query, &headers) {
        Some(t) => t,
        None => {
            return (StatusCode::UNAUTHORIZED, "Missing authentication token").into_response();
        }
    };

    let principal = match state.verifier.verify(&token) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "Token verification failed");
            return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
        }
    };

    tracing::info!(principal = %principal.id, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, principal))
}

/// Extract token from query parameter or Authorization header
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Handle an established WebSocket connection
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, principal),
    fields(principal = %principal.id)
)]
async fn handle_socket(socket: WebSocket, state: AppState, principal: Principal) {
    let principal_id = principal.id.clone();
    let connection_start = std::time::Instant::now();

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.settings.realtime.channel_buffer);

    // Registering evicts any prior connection for this principal
    let handle = state
        .registry
        .register(principal_id.clone(), principal.role, tx);
    let connection_id = handle.id;

    tracing::info!(
        connection_id = %connection_id,
        principal = %principal_id,
        role = %principal.role,
        "WebSocket connection established"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Pump outbound messages from the channel onto the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let close_after = matches!(msg, ServerMessage::ConnectionReplaced);
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
            if close_after {
                let _ = ws_sender.close().await;
                break;
            }
        }
    });

    let state_clone = state.clone();
    let handle_clone = handle.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &handle_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    // A superseded handle must not tear down the replacement's session state
    if state.registry.unregister(&handle) {
        state.sessions.handle_disconnect(&principal_id).await;
    }

    tracing::info!(
        connection_id = %connection_id,
        principal = %principal_id,
        duration_secs = connection_start.elapsed().as_secs_f64(),
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket frame.
/// Returns false if the connection should be closed.
async fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse client message");
                    let _ = handle
                        .send(ServerMessage::error(format!("invalid message: {}", e)))
                        .await;
                    return true;
                }
            };

            handle_client_message(client_msg, state, handle).await;
            true
        }
        Message::Binary(_) => {
            let _ = handle
                .send(ServerMessage::error("binary messages are not supported"))
                .await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Handle a parsed client message
#[tracing::instrument(
    name = "ws.message",
    skip(msg, state, handle),
    fields(connection_id = %handle.id, principal = %handle.principal)
)]
async fn handle_client_message(msg: ClientMessage, state: &AppState, handle: &Arc<ConnectionHandle>) {
    let me = handle.principal.as_str();

    let result = match msg {
        ClientMessage::JoinConsultation { room_id } => {
            match state.sessions.join(&room_id, me).await {
                Ok(outcome) => {
                    handle
                        .send(ServerMessage::ConsultationJoined {
                            room_id,
                            participants: outcome.participants,
                            history: outcome.history,
                        })
                        .await
                        .ok();
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        ClientMessage::VideoOffer {
            room_id,
            payload,
            to,
        } => {
            state
                .sessions
                .relay_signal(&room_id, me, SignalKind::Offer, &to, payload)
                .await
        }
        ClientMessage::VideoAnswer {
            room_id,
            payload,
            to,
        } => {
            state
                .sessions
                .relay_signal(&room_id, me, SignalKind::Answer, &to, payload)
                .await
        }
        ClientMessage::IceCandidate {
            room_id,
            payload,
            to,
        } => {
            state
                .sessions
                .relay_signal(&room_id, me, SignalKind::IceCandidate, &to, payload)
                .await
        }
        ClientMessage::SendMessage {
            room_id,
            message,
            kind,
        } => state
            .chat
            .append(&room_id, me, message, kind)
            .await
            .map(|_| ()),
        ClientMessage::Typing { room_id } => {
            state.chat.broadcast_typing(&room_id, me, true).await;
            Ok(())
        }
        ClientMessage::StopTyping { room_id } => {
            state.chat.broadcast_typing(&room_id, me, false).await;
            Ok(())
        }
        ClientMessage::ToggleAudio { room_id, enabled } => {
            state
                .sessions
                .toggle_media(&room_id, me, MediaKind::Audio, enabled)
                .await
        }
        ClientMessage::ToggleVideo { room_id, enabled } => {
            state
                .sessions
                .toggle_media(&room_id, me, MediaKind::Video, enabled)
                .await
        }
        ClientMessage::ScreenShare { room_id, enabled } => {
            state
                .sessions
                .toggle_media(&room_id, me, MediaKind::Screen, enabled)
                .await
        }
        ClientMessage::EndConsultation { room_id } => state.sessions.end(&room_id, me).await,
        ClientMessage::LeaveConsultation { room_id } => state.sessions.leave(&room_id, me).await,
    };

    if let Err(e) = result {
        tracing::warn!(
            connection_id = %handle.id,
            principal = %me,
            error = %e,
            "Client message rejected"
        );
        let _ = handle.send(ServerMessage::error(e.to_string())).await;
    }
}
