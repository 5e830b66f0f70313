//! # multicam-signaling
//!
//! WebSocket signaling relay for Multicam peer meshes. Handles:
//! - Room membership (`join-room`, `leave-room`)
//! - Presence fan-out (`peer-list` snapshot, `peer-joined`, `peer-left`)
//! - Microphone arbitration relay (`mic-toggle`)
//! - Heartbeat/keepalive
//!
//! Only setup metadata flows through here. Calls and media are negotiated
//! directly between peers by the WebRTC stack.

pub mod registry;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use multicam_common::config::SignalingConfig;
use multicam_common::protocol::{codes, SignalMessage};
use registry::RoomRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How long a closing connection may spend flushing its outbound queue.
const SEND_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Signaling relay state.
#[derive(Clone)]
pub struct SignalingState {
    pub registry: RoomRegistry,
    pub config: SignalingConfig,
}

impl SignalingState {
    pub fn new(config: SignalingConfig) -> Self {
        Self {
            registry: RoomRegistry::new(&config),
            config,
        }
    }
}

/// Build the signaling WebSocket router.
pub fn build_router(state: SignalingState) -> Router {
    Router::new()
        .route("/socket", get(ws_handler))
        .with_state(Arc::new(state))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SignalingState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Handle a single signaling WebSocket connection.
async fn handle_connection(socket: WebSocket, state: Arc<SignalingState>) {
    let (mut sender, mut receiver) = socket.split();

    let connection_id = Uuid::new_v4();

    // Everything destined for this socket (direct replies and room fan-out)
    // goes through one queue so frames keep their order.
    let (tx, mut rx) = mpsc::channel::<SignalMessage>(state.config.channel_capacity.max(1));

    tracing::debug!(connection = %connection_id, "Signaling WebSocket connected");

    // ── Sender task ──────────────────────────────────────────────────────────
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(json) = msg.to_json() else { continue };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // ── Receive loop ─────────────────────────────────────────────────────────
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let signal = match serde_json::from_str::<SignalMessage>(&text) {
                    Ok(s) => s,
                    Err(e) => {
                        reply(
                            &tx,
                            SignalMessage::error(codes::INVALID_MESSAGE, format!("Invalid message: {e}")),
                        )
                        .await;
                        continue;
                    }
                };
                handle_signal(&state, connection_id, &tx, signal).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────────────
    state.registry.leave(connection_id).await;
    close_outbound(tx, send_task).await;

    tracing::info!(connection = %connection_id, "Signaling WebSocket disconnected");
}

async fn handle_signal(
    state: &SignalingState,
    connection_id: Uuid,
    tx: &mpsc::Sender<SignalMessage>,
    signal: SignalMessage,
) {
    // Server → Client events should not be received from a client
    if !signal.is_client_event() {
        tracing::debug!(
            connection = %connection_id,
            event = signal.event_name(),
            "Client sent a server-only event"
        );
        reply(tx, SignalMessage::error(codes::INVALID_MESSAGE, "Invalid event")).await;
        return;
    }

    match signal {
        SignalMessage::JoinRoom { peer_id, room } => {
            if peer_id.trim().is_empty() {
                reply(tx, SignalMessage::error(codes::INVALID_MESSAGE, "peerId is required")).await;
                return;
            }
            let room = room.unwrap_or_else(|| state.config.default_room.clone());
            if let Err(e) = state
                .registry
                .join(connection_id, &peer_id, &room, tx.clone())
                .await
            {
                tracing::warn!(
                    connection = %connection_id,
                    peer = %peer_id,
                    room = %room,
                    error = %e,
                    "Join rejected"
                );
                reply(tx, e.to_signal()).await;
            }
        }

        SignalMessage::LeaveRoom => {
            state.registry.leave(connection_id).await;
        }

        SignalMessage::MicToggle { peer_id, enabled } => {
            if let Err(e) = state
                .registry
                .mic_toggle(connection_id, &peer_id, enabled)
                .await
            {
                reply(tx, e.to_signal()).await;
            }
        }

        SignalMessage::Heartbeat { .. } => {
            reply(
                tx,
                SignalMessage::HeartbeatAck {
                    timestamp: chrono::Utc::now().timestamp_millis(),
                },
            )
            .await;
        }

        // Rejected above
        SignalMessage::PeerList(_)
        | SignalMessage::PeerJoined(_)
        | SignalMessage::PeerLeft(_)
        | SignalMessage::HeartbeatAck { .. }
        | SignalMessage::Error { .. } => {}
    }
}

/// Let the sender task flush what is already queued (e.g. a final error
/// reply), then stop it.
async fn close_outbound(tx: mpsc::Sender<SignalMessage>, mut send_task: JoinHandle<()>) {
    drop(tx);
    if tokio::time::timeout(SEND_FLUSH_TIMEOUT, &mut send_task).await.is_err() {
        send_task.abort();
    }
}

/// Queue a direct reply for this connection.
async fn reply(tx: &mpsc::Sender<SignalMessage>, msg: SignalMessage) {
    let _ = tx.send(msg).await;
}
