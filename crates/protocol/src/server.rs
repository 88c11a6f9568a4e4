//! Server → Client messages

use serde::{Deserialize, Serialize};

use crate::types::UiMessage;

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full conversation replay for a newly admitted connection.
    History { messages: Vec<UiMessage> },

    /// One transformed fragment of the in-flight assistant reply.
    Fragment { content: String },

    /// The in-flight turn committed; `message` is the final assistant record.
    TurnComplete { message: UiMessage },

    /// This connection was superseded by a newer one and will no longer be
    /// served. The client should stop sending and show a takeover notice.
    Evicted,

    /// A turn failed before or during streaming. The conversation itself is
    /// unchanged.
    Error { message: String },
}
