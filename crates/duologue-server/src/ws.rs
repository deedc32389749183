//! WebSocket endpoint: auth, registration, history replay, read loop.
//!
//! Connection lifecycle:
//! 1. verify the token from the query string (bad token: 401, no upgrade),
//! 2. upgrade; an unknown room gets an `error` frame and an immediate close,
//! 3. register with the room, replay history, notify the coordinator,
//! 4. read frames until the socket closes, the heartbeat gives up, or the
//!    server shuts down,
//! 5. deregister; if the room emptied, the coordinator force-closes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use duologue_core::{OutboundEvent, ParticipantId, RoomId};
use duologue_rooms::PeerConnection;

use crate::auth;
use crate::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_REJECTED_TOTAL,
};
use crate::protocol::{ClientMessage, ServerFrame};
use crate::server::AppState;

/// Capacity of the per-connection writer channel.
const WRITER_CHANNEL_CAPACITY: usize = 64;

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// GET /api/sessions/ws/{room_id}?token=…
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let token = query.token.unwrap_or_default();
    let participant = match auth::verify_token(&token, &state.config.jwt_secret) {
        Ok(participant) => participant,
        Err(e) => {
            warn!(room_id, error = %e, "websocket auth failed");
            metrics::counter!(WS_REJECTED_TOTAL, "reason" => "auth").increment(1);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let room = RoomId::from(room_id);
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(state, socket, room, participant))
}

async fn handle_socket(
    state: AppState,
    socket: WebSocket,
    room: RoomId,
    participant: ParticipantId,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    match state.store.get_room(&room) {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!(room_id = %room, "connection to unknown room rejected");
            metrics::counter!(WS_REJECTED_TOTAL, "reason" => "unknown_room").increment(1);
            if let Ok(json) = serde_json::to_string(&OutboundEvent::error("room not found")) {
                let _ = ws_tx.send(Message::Text(json.into())).await;
            }
            let _ = ws_tx.close().await;
            return;
        }
        Err(e) => {
            error!(room_id = %room, error = %e, "room lookup failed");
            let _ = ws_tx.close().await;
            return;
        }
    }

    // Writer task: drains the connection channel into the socket.
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(WRITER_CHANNEL_CAPACITY);
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx
                .send(Message::Text(frame.as_str().into()))
                .await
                .is_err()
            {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let conn = Arc::new(PeerConnection::new(room.clone(), participant.clone(), tx));
    state.registry.join(Arc::clone(&conn));
    metrics::counter!(WS_CONNECTIONS_TOTAL).increment(1);
    metrics::gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(room_id = %room, participant = %participant, "websocket connected");

    // Replay before anything new can be queued for this connection.
    match state.store.history(&room) {
        Ok(rows) => {
            let frame = ServerFrame::ChatHistory {
                messages: rows.into_iter().map(Into::into).collect(),
            };
            if let Ok(json) = serde_json::to_string(&frame) {
                let _ = conn.send(Arc::new(json));
            }
        }
        Err(e) => error!(room_id = %room, error = %e, "history replay failed"),
    }

    if let Err(e) = state.coordinator.on_join(&room).await {
        error!(room_id = %room, error = %e, "join handling failed");
    }

    // Heartbeat: a timeout cancels this connection's token, which unblocks
    // the read loop below. Server shutdown cancels the parent.
    let cancel = state.shutdown.token().child_token();
    let heartbeat = {
        let conn = Arc::clone(&conn);
        let hb_cancel = cancel.clone();
        let on_timeout = cancel.clone();
        let interval = Duration::from_secs(state.config.heartbeat_interval_secs);
        let timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);
        tokio::spawn(async move {
            if run_heartbeat(conn, interval, timeout, hb_cancel).await == HeartbeatResult::TimedOut
            {
                on_timeout.cancel();
            }
        })
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            incoming = ws_rx.next() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Pong(_))) => conn.mark_alive(),
                    Some(Ok(Message::Text(text))) => {
                        conn.mark_alive();
                        handle_text(&state, &room, &participant, &conn, text.as_str()).await;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    cancel.cancel();
    heartbeat.abort();
    writer.abort();
    metrics::counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    metrics::gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    info!(room_id = %room, participant = %participant, "websocket disconnected");

    if state.registry.leave(&conn) {
        state.coordinator.on_room_empty(&room).await;
    }
}

async fn handle_text(
    state: &AppState,
    room: &RoomId,
    participant: &ParticipantId,
    conn: &Arc<PeerConnection>,
    text: &str,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(room_id = %room, participant = %participant, error = %e, "malformed client frame");
            send_direct(conn, &OutboundEvent::error("invalid message format"));
            return;
        }
    };

    match msg {
        ClientMessage::Ping => {
            if let Ok(json) = serde_json::to_string(&ServerFrame::Pong) {
                let _ = conn.send(Arc::new(json));
            }
        }
        ClientMessage::Message { content } => {
            if let Err(e) = state.coordinator.on_chat(room, participant, &content).await {
                error!(room_id = %room, participant = %participant, error = %e, "chat handling failed");
                send_direct(conn, &OutboundEvent::error("failed to deliver message"));
            }
        }
        ClientMessage::Vote { choice } => {
            if let Err(e) = state.coordinator.on_vote(room, participant, choice).await {
                error!(room_id = %room, participant = %participant, error = %e, "vote handling failed");
                send_direct(conn, &OutboundEvent::error("failed to record vote"));
            }
        }
    }
}

fn send_direct(conn: &Arc<PeerConnection>, event: &OutboundEvent) {
    if let Ok(json) = serde_json::to_string(event) {
        let _ = conn.send(Arc::new(json));
    }
}
