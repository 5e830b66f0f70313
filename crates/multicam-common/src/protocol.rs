//! Signaling wire protocol shared by the relay and the peer core.
//!
//! Frames are JSON text messages: `{"event": "peer-joined", "data": "abc"}`.
//! Event names are kebab-case, payload fields camelCase. Only session setup
//! metadata travels here; media flows peer to peer.

use serde::{Deserialize, Serialize};

/// Peer id reserved for the local stream in client-side maps.
pub const LOCAL_PEER_ID: &str = "local";

/// Error codes carried by [`SignalMessage::Error`].
pub mod codes {
    pub const INVALID_MESSAGE: u16 = 4000;
    pub const NOT_IN_ROOM: u16 = 4003;
    pub const INVALID_ROOM: u16 = 4022;
    pub const ROOM_FULL: u16 = 4029;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum SignalMessage {
    // === Client → Server ===
    /// Join `room`, or the relay's default room.
    JoinRoom {
        peer_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
    },

    /// Leave the current room but keep the socket open.
    LeaveRoom,

    /// Keepalive.
    Heartbeat { timestamp: i64 },

    // === Bidirectional ===
    /// `peer_id`'s microphone was toggled. Relayed to the rest of the room.
    MicToggle { peer_id: String, enabled: bool },

    // === Server → Client ===
    /// Everyone else already in the room, sent once to the joiner.
    PeerList(Vec<String>),

    PeerJoined(String),

    PeerLeft(String),

    HeartbeatAck { timestamp: i64 },

    Error { code: u16, message: String },
}

impl SignalMessage {
    /// Whether a client may send this event to the relay.
    pub fn is_client_event(&self) -> bool {
        matches!(
            self,
            Self::JoinRoom { .. } | Self::LeaveRoom | Self::Heartbeat { .. } | Self::MicToggle { .. }
        )
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Event name as it appears on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::LeaveRoom => "leave-room",
            Self::Heartbeat { .. } => "heartbeat",
            Self::MicToggle { .. } => "mic-toggle",
            Self::PeerList(_) => "peer-list",
            Self::PeerJoined(_) => "peer-joined",
            Self::PeerLeft(_) => "peer-left",
            Self::HeartbeatAck { .. } => "heartbeat-ack",
            Self::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_without_room_uses_camel_case() {
        let msg: SignalMessage =
            serde_json::from_str(r#"{"event":"join-room","data":{"peerId":"a1"}}"#).unwrap();
        assert_eq!(
            msg,
            SignalMessage::JoinRoom {
                peer_id: "a1".into(),
                room: None
            }
        );
        assert!(msg.is_client_event());
    }

    #[test]
    fn peer_events_carry_bare_payloads() {
        let joined = SignalMessage::PeerJoined("b2".into()).to_json().unwrap();
        assert_eq!(joined, r#"{"event":"peer-joined","data":"b2"}"#);

        let list = SignalMessage::PeerList(vec!["a".into(), "b".into()])
            .to_json()
            .unwrap();
        assert_eq!(list, r#"{"event":"peer-list","data":["a","b"]}"#);
        assert!(!SignalMessage::PeerList(vec![]).is_client_event());
    }

    #[test]
    fn mic_toggle_shape() {
        let msg: SignalMessage = serde_json::from_str(
            r#"{"event":"mic-toggle","data":{"peerId":"c3","enabled":true}}"#,
        )
        .unwrap();
        assert_eq!(msg.event_name(), "mic-toggle");
        assert_eq!(
            msg,
            SignalMessage::MicToggle {
                peer_id: "c3".into(),
                enabled: true
            }
        );
    }

    #[test]
    fn leave_room_has_no_payload() {
        let msg: SignalMessage = serde_json::from_str(r#"{"event":"leave-room"}"#).unwrap();
        assert_eq!(msg, SignalMessage::LeaveRoom);
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(serde_json::from_str::<SignalMessage>(r#"{"event":"offer","data":{}}"#).is_err());
    }
}
