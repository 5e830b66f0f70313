//! # multicam-mesh
//!
//! Client-side core of a Multicam full mesh. Every participant opens a direct
//! call to every other participant; the relay only tells them who is there.
//!
//! - [`session::MeshSession`] coordinates presence, calls and mic arbitration
//! - [`client::SignalingClient`] keeps the relay connection alive
//! - [`transport::PeerTransport`] is implemented by the WebRTC stack in use

pub mod audio;
pub mod client;
pub mod error;
pub mod mic;
pub mod presence;
pub mod session;
pub mod stats;
pub mod transport;

pub use error::{MeshError, Result};
