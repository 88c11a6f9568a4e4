//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

/// Literal marker the model emits to open an insight span.
pub const INSIGHT_OPEN_TAG: &str = "<insight>";

/// Literal marker the model emits to close an insight span.
pub const INSIGHT_CLOSE_TAG: &str = "</insight>";

/// Fixed markup the client renders in place of the open marker.
pub const INSIGHT_WRAPPER_OPEN: &str = "<aside class=\"insight\">";

/// Fixed markup the client renders in place of the close marker.
pub const INSIGHT_WRAPPER_CLOSE: &str = "</aside>";

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A message in the rendered conversation, exactly as a reconnecting client
/// must replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiMessage {
    pub role: Role,
    pub content: String,
}

impl UiMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
