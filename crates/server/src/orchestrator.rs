//! Turn orchestrator
//!
//! Drives one request/response cycle: opens a model stream, pipes every
//! fragment through the transcoder, mirrors the raw fragments into the
//! pending log, pushes transformed fragments to the live UI, and on stream
//! exhaustion commits the turn to both history stores in one critical
//! section.
//!
//! A stale connection must not silently persist its output as if it were
//! canonical, nor visibly continue rendering. Eviction is therefore checked
//! immediately before every state mutation and every UI push — and re-checked
//! under the history lock right before the final commit, so the
//! check-to-commit window is as small as it can be.

use std::sync::Arc;

use async_trait::async_trait;
use lantern_protocol::UiMessage;
use tracing::{debug, info, warn};

use crate::session_guard::ConnectionId;
use crate::state::AppState;
use crate::transcoder::TagTranscoder;

/// UI push boundary. All methods are fire-and-forget; delivery failure is the
/// implementation's problem and never surfaces here.
#[async_trait]
pub trait UiSink: Send + Sync {
    async fn push_fragment(&self, conn: ConnectionId, fragment: &str);
    async fn replay_history(&self, conn: ConnectionId, messages: Vec<UiMessage>);
    async fn notify_evicted(&self, conn: ConnectionId);
    async fn notify_error(&self, conn: ConnectionId, message: &str);
    async fn turn_complete(&self, conn: ConnectionId, message: UiMessage);
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Stream exhausted, both stores committed.
    Committed,
    /// The owning connection was superseded; everything discarded. Not an
    /// error — never raised or logged as a failure.
    Evicted,
    /// The model boundary failed before or during the stream; nothing
    /// committed, error surfaced to the client.
    Failed,
}

pub struct TurnOrchestrator {
    state: Arc<AppState>,
}

impl TurnOrchestrator {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn run_turn(
        &self,
        sink: &dyn UiSink,
        conn: ConnectionId,
        user_input: &str,
    ) -> TurnOutcome {
        let guard = &self.state.guard;
        if !guard.is_active(conn) {
            return TurnOutcome::Evicted;
        }

        // Seed the model's memory from the canonical turn history. An
        // aborted predecessor turn may have left the client's own memory
        // ahead of what was actually committed.
        let prior = {
            let mut history = self.state.history.lock().await;
            history.begin_turn();
            history.turns.snapshot()
        };
        self.state.model.set_memory(prior);

        let mut rx = match self.state.model.open_stream(user_input).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(
                    component = "orchestrator",
                    event = "turn.open_failed",
                    connection_id = %conn,
                    error = %e,
                    "Model stream could not be opened"
                );
                sink.notify_error(conn, &e.to_string()).await;
                return TurnOutcome::Failed;
            }
        };

        let mut transcoder = TagTranscoder::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok(fragment) => {
                    {
                        let mut history = self.state.history.lock().await;
                        if !guard.is_active(conn) {
                            // The successor owns the pending log now; leave
                            // it alone and walk away.
                            return TurnOutcome::Evicted;
                        }
                        history.pending.append(&fragment);
                    }
                    for out in transcoder.process(&fragment) {
                        if !guard.is_active(conn) {
                            return TurnOutcome::Evicted;
                        }
                        sink.push_fragment(conn, &out).await;
                    }
                }
                Err(e) => {
                    warn!(
                        component = "orchestrator",
                        event = "turn.stream_failed",
                        connection_id = %conn,
                        error = %e,
                        "Model stream failed mid-turn, discarding partial output"
                    );
                    let mut history = self.state.history.lock().await;
                    if guard.is_active(conn) {
                        history.discard_pending();
                    }
                    drop(history);
                    sink.notify_error(conn, &e.to_string()).await;
                    return TurnOutcome::Failed;
                }
            }
        }

        debug!(
            component = "orchestrator",
            event = "turn.stream_end",
            connection_id = %conn,
            insight_chars = transcoder.captured_insight().len(),
            unterminated_tag = transcoder.in_tag(),
        );
        for out in transcoder.finalize() {
            if !guard.is_active(conn) {
                return TurnOutcome::Evicted;
            }
            sink.push_fragment(conn, &out).await;
        }

        // The committed turns are built inside the critical section from the
        // pending log this turn owns — never read back from the model
        // client's shared memory, where an evicted predecessor's stream can
        // still fold in its own assistant turn at any time.
        let (assistant, turns_total) = {
            let mut history = self.state.history.lock().await;
            // Final check under the lock that also serializes the commit.
            if !guard.is_active(conn) {
                return TurnOutcome::Evicted;
            }
            let assistant = history.commit_turn(user_input);
            (assistant, history.turns.len())
        };
        info!(
            component = "orchestrator",
            event = "turn.committed",
            connection_id = %conn,
            assistant_chars = assistant.content.len(),
            turns_total,
            "Turn committed"
        );
        sink.turn_complete(conn, assistant).await;
        TurnOutcome::Committed
    }
}
