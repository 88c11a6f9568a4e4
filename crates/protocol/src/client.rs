//! Client → Server messages

use serde::{Deserialize, Serialize};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// User submitted a prompt for the agent.
    UserInput { content: String },

    /// Wipe the conversation and start over.
    NewSession,
}
