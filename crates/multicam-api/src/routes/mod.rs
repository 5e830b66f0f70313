//! API route modules.

pub mod health;
pub mod rooms;
pub mod signaling;
pub mod token;
