//! Room registry: who is connected to which signaling room.
//!
//! Two indexes for fast lookups:
//! - `rooms`: room name → members in join order, plus the room's hot microphone
//! - `by_connection`: connection id → room name
//!
//! Both live behind one lock so a join or leave and the events it fans out
//! happen atomically with respect to other connections.

use chrono::{DateTime, Utc};
use multicam_common::config::SignalingConfig;
use multicam_common::protocol::{codes, SignalMessage};
use multicam_common::validation::validate_room_name;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// One WebSocket connection. A peer id may be shared by several connections.
pub type ConnectionId = Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Room {room} is full ({limit} peers)")]
    RoomFull { room: String, limit: usize },

    #[error("Not in a room")]
    NotInRoom,

    #[error("Invalid room name: {0}")]
    InvalidRoom(String),
}

impl RegistryError {
    /// Error code sent back to the client.
    pub fn code(&self) -> u16 {
        match self {
            Self::RoomFull { .. } => codes::ROOM_FULL,
            Self::NotInRoom => codes::NOT_IN_ROOM,
            Self::InvalidRoom(_) => codes::INVALID_ROOM,
        }
    }

    pub fn to_signal(&self) -> SignalMessage {
        SignalMessage::error(self.code(), self.to_string())
    }
}

struct Member {
    connection_id: ConnectionId,
    peer_id: String,
    tx: mpsc::Sender<SignalMessage>,
    joined_at: DateTime<Utc>,
}

#[derive(Default)]
struct Room {
    members: Vec<Member>,
    /// Peer whose microphone was most recently announced as enabled.
    hot_mic: Option<String>,
}

impl Room {
    /// Send to every member except `origin`.
    fn broadcast(&self, room: &str, origin: ConnectionId, msg: &SignalMessage) {
        for member in self.members.iter().filter(|m| m.connection_id != origin) {
            deliver(room, member, msg.clone());
        }
    }
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<String, Room>,
    by_connection: HashMap<ConnectionId, String>,
}

/// Successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub room: String,
    /// Other peers already present, as sent in `peer-list`.
    pub peers: Vec<String>,
    /// Peer id this connection had before switching rooms or ids.
    pub replaced: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomMember {
    pub connection_id: ConnectionId,
    pub peer_id: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub name: String,
    pub members: Vec<RoomMember>,
    pub hot_mic: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalingStats {
    pub active_rooms: usize,
    pub total_connections: usize,
    pub rooms: Vec<RoomSnapshot>,
}

/// Shared relay state. Cheap to clone.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RwLock<Inner>>,
    max_peers_per_room: usize,
}

impl RoomRegistry {
    pub fn new(config: &SignalingConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            max_peers_per_room: config.max_peers_per_room,
        }
    }

    /// Join `room` as `peer_id`. The joiner receives `peer-list`, everyone
    /// else in the room receives `peer-joined`. A connection that is already
    /// in a room leaves it first.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        peer_id: &str,
        room: &str,
        tx: mpsc::Sender<SignalMessage>,
    ) -> Result<JoinOutcome, RegistryError> {
        validate_room_name(room).map_err(|_| RegistryError::InvalidRoom(room.to_string()))?;

        let mut inner = self.inner.write().await;

        let rejoining_same_room = inner
            .by_connection
            .get(&connection_id)
            .is_some_and(|current| current == room);
        let current_size = inner.rooms.get(room).map_or(0, |r| r.members.len());
        let size_after_join = if rejoining_same_room {
            current_size
        } else {
            current_size + 1
        };
        if self.max_peers_per_room > 0 && size_after_join > self.max_peers_per_room {
            return Err(RegistryError::RoomFull {
                room: room.to_string(),
                limit: self.max_peers_per_room,
            });
        }

        let replaced = remove_connection(&mut inner, connection_id).map(|(_, peer)| peer);

        let entry = inner.rooms.entry(room.to_string()).or_default();

        let peers: Vec<String> = entry
            .members
            .iter()
            .filter(|m| m.peer_id != peer_id)
            .map(|m| m.peer_id.clone())
            .collect();

        let member = Member {
            connection_id,
            peer_id: peer_id.to_string(),
            tx,
            joined_at: Utc::now(),
        };

        // Another connection already announced this peer id.
        let already_present = entry.members.iter().any(|m| m.peer_id == peer_id);

        deliver(room, &member, SignalMessage::PeerList(peers.clone()));
        if !already_present {
            entry.broadcast(room, connection_id, &SignalMessage::PeerJoined(peer_id.to_string()));
        }
        entry.members.push(member);

        inner.by_connection.insert(connection_id, room.to_string());

        tracing::info!(
            connection = %connection_id,
            peer = %peer_id,
            room = %room,
            others = peers.len(),
            "Peer joined signaling room"
        );

        Ok(JoinOutcome {
            room: room.to_string(),
            peers,
            replaced,
        })
    }

    /// Remove a connection from its room and tell the remaining members.
    /// Returns `(room, peer_id)`; `None` if the connection never joined.
    pub async fn leave(&self, connection_id: ConnectionId) -> Option<(String, String)> {
        let mut inner = self.inner.write().await;
        let left = remove_connection(&mut inner, connection_id);

        if let Some((room, peer)) = &left {
            tracing::info!(
                connection = %connection_id,
                peer = %peer,
                room = %room,
                "Peer left signaling room"
            );
        }

        left
    }

    /// Relay a microphone toggle to the rest of the sender's room.
    ///
    /// The room's hot microphone is last-writer-wins: enabling makes `peer_id`
    /// hot, disabling clears it only when `peer_id` is the current holder.
    pub async fn mic_toggle(
        &self,
        connection_id: ConnectionId,
        peer_id: &str,
        enabled: bool,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        let room_name = inner
            .by_connection
            .get(&connection_id)
            .cloned()
            .ok_or(RegistryError::NotInRoom)?;
        let room = inner
            .rooms
            .get_mut(&room_name)
            .ok_or(RegistryError::NotInRoom)?;

        if enabled {
            room.hot_mic = Some(peer_id.to_string());
        } else if room.hot_mic.as_deref() == Some(peer_id) {
            room.hot_mic = None;
        }

        room.broadcast(
            &room_name,
            connection_id,
            &SignalMessage::MicToggle {
                peer_id: peer_id.to_string(),
                enabled,
            },
        );

        tracing::debug!(
            connection = %connection_id,
            peer = %peer_id,
            room = %room_name,
            enabled,
            "Mic toggle relayed"
        );

        Ok(())
    }

    /// Current hot microphone of `room`.
    pub async fn hot_mic(&self, room: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .rooms
            .get(room)
            .and_then(|r| r.hot_mic.clone())
    }

    /// Peer ids in `room`, in join order.
    pub async fn room_peers(&self, room: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .rooms
            .get(room)
            .map(|r| r.members.iter().map(|m| m.peer_id.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn stats(&self) -> SignalingStats {
        let inner = self.inner.read().await;

        let mut rooms: Vec<RoomSnapshot> = inner
            .rooms
            .iter()
            .map(|(name, room)| RoomSnapshot {
                name: name.clone(),
                members: room
                    .members
                    .iter()
                    .map(|m| RoomMember {
                        connection_id: m.connection_id,
                        peer_id: m.peer_id.clone(),
                        joined_at: m.joined_at,
                    })
                    .collect(),
                hot_mic: room.hot_mic.clone(),
            })
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));

        SignalingStats {
            active_rooms: rooms.len(),
            total_connections: inner.by_connection.len(),
            rooms,
        }
    }
}

/// Detach a connection, broadcast `peer-left` and drop the room once empty.
fn remove_connection(inner: &mut Inner, connection_id: ConnectionId) -> Option<(String, String)> {
    let room_name = inner.by_connection.remove(&connection_id)?;
    let room = inner.rooms.get_mut(&room_name)?;

    let idx = room
        .members
        .iter()
        .position(|m| m.connection_id == connection_id)?;
    let member = room.members.remove(idx);

    // The peer is only gone once its last connection leaves.
    let still_present = room.members.iter().any(|m| m.peer_id == member.peer_id);
    if !still_present {
        if room.hot_mic.as_deref() == Some(member.peer_id.as_str()) {
            room.hot_mic = None;
        }
        room.broadcast(
            &room_name,
            connection_id,
            &SignalMessage::PeerLeft(member.peer_id.clone()),
        );
    }

    if room.members.is_empty() {
        inner.rooms.remove(&room_name);
    }

    Some((room_name, member.peer_id))
}

/// Non-blocking send. A slow or gone client loses the frame; the relay never waits.
fn deliver(room: &str, member: &Member, msg: SignalMessage) {
    match member.tx.try_send(msg) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(msg)) => {
            tracing::warn!(
                room = %room,
                peer = %member.peer_id,
                event = msg.event_name(),
                "Outbound signaling queue full, dropping frame"
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(room = %room, peer = %member.peer_id, "Connection already closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(limit: usize) -> RoomRegistry {
        RoomRegistry::new(&SignalingConfig {
            max_peers_per_room: limit,
            ..Default::default()
        })
    }

    fn channel() -> (mpsc::Sender<SignalMessage>, mpsc::Receiver<SignalMessage>) {
        mpsc::channel(16)
    }

    fn drain(rx: &mut mpsc::Receiver<SignalMessage>) -> Vec<SignalMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn joiner_gets_snapshot_and_others_get_joined() {
        let reg = registry(0);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();

        let first = reg.join(a, "alice", "main-room", tx_a).await.unwrap();
        assert!(first.peers.is_empty());
        assert_eq!(drain(&mut rx_a), vec![SignalMessage::PeerList(vec![])]);

        let second = reg.join(b, "bob", "main-room", tx_b).await.unwrap();
        assert_eq!(second.peers, vec!["alice".to_string()]);
        assert_eq!(
            drain(&mut rx_b),
            vec![SignalMessage::PeerList(vec!["alice".into()])]
        );
        assert_eq!(
            drain(&mut rx_a),
            vec![SignalMessage::PeerJoined("bob".into())]
        );
    }

    #[tokio::test]
    async fn peer_list_excludes_own_id_from_other_sockets() {
        let reg = registry(0);
        let (tx1, _rx1) = channel();
        let (tx2, mut rx2) = channel();

        reg.join(Uuid::new_v4(), "alice", "main-room", tx1).await.unwrap();
        let outcome = reg.join(Uuid::new_v4(), "alice", "main-room", tx2).await.unwrap();

        assert!(outcome.peers.is_empty());
        assert_eq!(drain(&mut rx2), vec![SignalMessage::PeerList(vec![])]);
    }

    #[tokio::test]
    async fn shared_peer_id_is_announced_once_and_leaves_with_last_socket() {
        let reg = registry(0);
        let (alice_1, alice_2) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_bob, mut rx_bob) = channel();
        let (tx_1, mut rx_1) = channel();
        let (tx_2, _rx_2) = channel();

        reg.join(Uuid::new_v4(), "bob", "main-room", tx_bob).await.unwrap();
        reg.join(alice_1, "alice", "main-room", tx_1).await.unwrap();
        drain(&mut rx_bob);
        drain(&mut rx_1);

        reg.join(alice_2, "alice", "main-room", tx_2).await.unwrap();
        assert!(drain(&mut rx_bob).is_empty());
        assert!(drain(&mut rx_1).is_empty());

        reg.leave(alice_1).await;
        assert!(drain(&mut rx_bob).is_empty());

        reg.leave(alice_2).await;
        assert_eq!(drain(&mut rx_bob), vec![SignalMessage::PeerLeft("alice".into())]);
    }

    #[tokio::test]
    async fn leave_notifies_remaining_and_drops_empty_room() {
        let reg = registry(0);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, mut rx_a) = channel();
        let (tx_b, _rx_b) = channel();

        reg.join(a, "alice", "main-room", tx_a).await.unwrap();
        reg.join(b, "bob", "main-room", tx_b).await.unwrap();
        drain(&mut rx_a);

        assert_eq!(
            reg.leave(b).await,
            Some(("main-room".to_string(), "bob".to_string()))
        );
        assert_eq!(drain(&mut rx_a), vec![SignalMessage::PeerLeft("bob".into())]);

        reg.leave(a).await;
        assert_eq!(reg.stats().await.active_rooms, 0);
    }

    #[tokio::test]
    async fn leaving_without_joining_is_silent() {
        let reg = registry(0);
        let (tx, mut rx) = channel();
        reg.join(Uuid::new_v4(), "alice", "main-room", tx).await.unwrap();
        drain(&mut rx);

        assert_eq!(reg.leave(Uuid::new_v4()).await, None);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn rejoin_moves_connection_between_rooms() {
        let reg = registry(0);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, _rx_a) = channel();
        let (tx_b, mut rx_b) = channel();

        reg.join(a, "alice", "general", tx_a.clone()).await.unwrap();
        reg.join(b, "bob", "general", tx_b).await.unwrap();
        drain(&mut rx_b);

        let outcome = reg.join(a, "alice", "studio", tx_a).await.unwrap();
        assert_eq!(outcome.replaced.as_deref(), Some("alice"));
        assert_eq!(drain(&mut rx_b), vec![SignalMessage::PeerLeft("alice".into())]);
        assert_eq!(reg.room_peers("general").await, vec!["bob".to_string()]);
        assert_eq!(reg.room_peers("studio").await, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn full_room_rejects_new_connections() {
        let reg = registry(2);
        for name in ["a", "b"] {
            let (tx, _rx) = channel();
            reg.join(Uuid::new_v4(), name, "main-room", tx).await.unwrap();
        }

        let (tx, _rx) = channel();
        let err = reg
            .join(Uuid::new_v4(), "c", "main-room", tx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::ROOM_FULL);
    }

    #[tokio::test]
    async fn full_room_still_allows_rejoin_by_member() {
        let reg = registry(1);
        let a = Uuid::new_v4();
        let (tx, _rx) = channel();
        reg.join(a, "alice", "main-room", tx.clone()).await.unwrap();
        assert!(reg.join(a, "alice", "main-room", tx).await.is_ok());
        assert_eq!(reg.room_peers("main-room").await.len(), 1);
    }

    #[tokio::test]
    async fn mic_toggle_relays_and_tracks_hot_mic() {
        let reg = registry(0);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        reg.join(a, "alice", "main-room", tx_a).await.unwrap();
        reg.join(b, "bob", "main-room", tx_b).await.unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        reg.mic_toggle(a, "alice", true).await.unwrap();
        assert_eq!(reg.hot_mic("main-room").await.as_deref(), Some("alice"));
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(
            drain(&mut rx_b),
            vec![SignalMessage::MicToggle {
                peer_id: "alice".into(),
                enabled: true
            }]
        );

        // Last writer wins
        reg.mic_toggle(b, "bob", true).await.unwrap();
        assert_eq!(reg.hot_mic("main-room").await.as_deref(), Some("bob"));

        // Disabling someone who isn't hot leaves the holder alone
        reg.mic_toggle(a, "alice", false).await.unwrap();
        assert_eq!(reg.hot_mic("main-room").await.as_deref(), Some("bob"));

        reg.leave(b).await;
        assert_eq!(reg.hot_mic("main-room").await, None);
    }

    #[tokio::test]
    async fn mic_toggle_requires_membership() {
        let reg = registry(0);
        let err = reg
            .mic_toggle(Uuid::new_v4(), "ghost", true)
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::NotInRoom);
    }

    #[tokio::test]
    async fn full_queue_drops_frames_without_blocking() {
        let reg = registry(0);
        let (tx_slow, mut rx_slow) = mpsc::channel(1);
        reg.join(Uuid::new_v4(), "slow", "main-room", tx_slow).await.unwrap();

        for i in 0..5 {
            let (tx, _rx) = channel();
            reg.join(Uuid::new_v4(), &format!("p{i}"), "main-room", tx)
                .await
                .unwrap();
        }

        // Only the initial peer-list fit in the queue
        assert_eq!(drain(&mut rx_slow), vec![SignalMessage::PeerList(vec![])]);
        assert_eq!(reg.room_peers("main-room").await.len(), 6);
    }

    #[tokio::test]
    async fn invalid_room_names_are_rejected() {
        let reg = registry(0);
        let (tx, _rx) = channel();
        let err = reg
            .join(Uuid::new_v4(), "alice", "../admin", tx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::INVALID_ROOM);
    }
}
