//! # multicam-common
//!
//! Shared configuration, error handling, the signaling wire protocol and LiveKit
//! access tokens used across all Multicam crates.

pub mod config;
pub mod error;
pub mod livekit;
pub mod protocol;
pub mod validation;
