//! Error types for the mesh core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    /// The peer transport rejected an operation.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An error from the WebSocket layer.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The transport never reported its own peer id.
    #[error("Mesh setup did not complete within {0:?}")]
    SetupTimeout(std::time::Duration),

    /// The signaling channel closed underneath the session.
    #[error("Signaling connection closed")]
    SignalingClosed,

    /// The transport event stream ended.
    #[error("Transport closed")]
    TransportClosed,

    /// Gave up reconnecting to the relay.
    #[error("Signaling reconnect failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, MeshError>;
