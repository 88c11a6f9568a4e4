//! Application state

use std::collections::HashMap;
use std::sync::Arc;

use lantern_model::ModelClient;
use lantern_protocol::{ServerMessage, UiMessage};
use tokio::sync::{mpsc, Mutex};

use crate::orchestrator::UiSink;
use crate::session_guard::{ConnectionId, SessionGuard};
use crate::store::HistoryState;

/// Shared application state
pub struct AppState {
    /// Turn history, UI history, and the in-flight raw log, under one lock.
    pub history: Mutex<HistoryState>,

    /// Single-active-connection guard.
    pub guard: SessionGuard,

    /// Outbound channels for connected clients.
    pub connections: ConnectionRegistry,

    /// Model collaborator boundary.
    pub model: Arc<dyn ModelClient>,
}

impl AppState {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self {
            history: Mutex::new(HistoryState::new()),
            guard: SessionGuard::new(),
            connections: ConnectionRegistry::default(),
            model,
        }
    }
}

/// ConnectionId → outbound sender map. Doubles as the [`UiSink`] for the
/// WebSocket layer: every push is fire-and-forget, and delivery failure
/// (connection already gone) is swallowed, never propagated.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<ConnectionId, mpsc::Sender<ServerMessage>>>,
}

impl ConnectionRegistry {
    pub async fn register(&self, id: ConnectionId, tx: mpsc::Sender<ServerMessage>) {
        self.inner.lock().await.insert(id, tx);
    }

    pub async fn remove(&self, id: ConnectionId) {
        self.inner.lock().await.remove(&id);
    }

    async fn send(&self, id: ConnectionId, msg: ServerMessage) {
        let tx = self.inner.lock().await.get(&id).cloned();
        if let Some(tx) = tx {
            let _ = tx.send(msg).await;
        }
    }
}

#[async_trait::async_trait]
impl UiSink for ConnectionRegistry {
    async fn push_fragment(&self, conn: ConnectionId, fragment: &str) {
        self.send(
            conn,
            ServerMessage::Fragment {
                content: fragment.to_string(),
            },
        )
        .await;
    }

    async fn replay_history(&self, conn: ConnectionId, messages: Vec<UiMessage>) {
        self.send(conn, ServerMessage::History { messages }).await;
    }

    async fn notify_evicted(&self, conn: ConnectionId) {
        self.send(conn, ServerMessage::Evicted).await;
    }

    async fn notify_error(&self, conn: ConnectionId, message: &str) {
        self.send(
            conn,
            ServerMessage::Error {
                message: message.to_string(),
            },
        )
        .await;
    }

    async fn turn_complete(&self, conn: ConnectionId, message: UiMessage) {
        self.send(conn, ServerMessage::TurnComplete { message }).await;
    }
}
