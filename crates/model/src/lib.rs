//! Lantern model client boundary
//!
//! The orchestrator only ever talks to a [`ModelClient`]: open a stream of
//! text fragments for a user prompt, and read back or seed the client's own
//! conversational memory. [`anthropic::AnthropicClient`] is the production
//! implementation; [`mock::MockModelClient`] is the scriptable test double.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

pub mod anthropic;
pub mod mock;

pub use anthropic::AnthropicClient;

/// Receiver side of one in-flight model stream. The stream ends when the
/// channel closes; mid-stream failures arrive as `Err` items.
pub type FragmentReceiver = mpsc::Receiver<Result<String, ModelError>>;

/// Errors raised at the model boundary
#[derive(Debug, Error)]
pub enum ModelError {
    /// The one user-facing error that can be raised before any turn begins.
    #[error("no model credential configured: set {} to enable the assistant", anthropic::API_KEY_ENV)]
    MissingCredential,

    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("model stream error: {0}")]
    Stream(String),
}

/// Role of a turn in the model's own memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One request/response unit in the model's conversational memory. Opaque to
/// the core beyond being an ordered, immutable-once-committed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Collaborator boundary for the turn orchestrator.
///
/// `open_stream` records the user turn in the client's memory and returns a
/// channel of raw text fragments; when the stream completes normally the
/// client folds the accumulated assistant text back into its memory, so that
/// `memory()` observed after stream end reflects the full exchange.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn open_stream(&self, user_input: &str) -> Result<FragmentReceiver, ModelError>;

    /// Current conversational memory, oldest turn first.
    fn memory(&self) -> Vec<Turn>;

    /// Replace the conversational memory wholesale (seed or reset).
    fn set_memory(&self, turns: Vec<Turn>);
}
