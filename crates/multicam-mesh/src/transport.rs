//! The seam between the mesh coordinator and whatever WebRTC stack places
//! the actual calls.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Notifications from the transport to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport registered and was given its own peer id.
    Open { peer_id: String },
    /// A remote peer is calling us.
    IncomingCall { peer_id: String },
    /// Media from `peer_id` arrived. `audio_enabled` is the state of its audio track.
    RemoteStream { peer_id: String, audio_enabled: bool },
    CallClosed { peer_id: String },
    CallError { peer_id: String, message: String },
}

/// Operations the session needs from a peer-to-peer media stack.
///
/// Implementations report progress through a `TransportEvent` channel
/// handed to `MeshSession::run`.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Place an outbound call carrying the local stream.
    async fn call(&self, peer_id: &str) -> Result<()>;

    /// Answer an inbound call with the local stream.
    async fn answer(&self, peer_id: &str) -> Result<()>;

    async fn hang_up(&self, peer_id: &str) -> Result<()>;

    async fn set_local_audio(&self, enabled: bool) -> Result<()>;

    async fn set_remote_audio(&self, peer_id: &str, enabled: bool) -> Result<()>;

    /// JSON form of the call's `RTCStatsReport`.
    async fn get_stats(&self, peer_id: &str) -> Result<Vec<Value>>;

    /// Send `ping` on the call's data channel.
    async fn send_keepalive(&self, peer_id: &str) -> Result<()>;

    /// Cap outgoing video, in bits per second.
    async fn set_max_video_bitrate(&self, bps: u32) -> Result<()>;

    /// Byte frequency data for a stream (`local` or a peer id). `None` when the
    /// stream has no audio track or the stack cannot analyse it.
    async fn frequency_data(&self, _stream_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}
