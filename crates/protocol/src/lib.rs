//! Lantern Protocol
//!
//! Shared types for communication between the Lantern server and its browser
//! client. These types are serialized as JSON over WebSocket.

pub mod client;
pub mod server;
pub mod types;

pub use client::ClientMessage;
pub use server::ServerMessage;
pub use types::*;
