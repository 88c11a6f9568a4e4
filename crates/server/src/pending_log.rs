//! Raw-output log for the in-flight turn
//!
//! Records model fragments exactly as they arrived, independent of the
//! transcoder's transformation. The raw text (not the markup) is what must
//! remain visible to the agent's own subsequent reasoning, so this log is the
//! source of the committed assistant message.

/// Append-only buffer of raw fragments, drained once per completed turn.
#[derive(Debug, Default)]
pub struct PendingOutputLog {
    fragments: Vec<String>,
}

impl PendingOutputLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one raw fragment. Never fails.
    pub fn append(&mut self, fragment: &str) {
        self.fragments.push(fragment.to_string());
    }

    /// Concatenate everything in arrival order, with no separator, and clear
    /// the log. Safe with zero prior appends.
    pub fn drain_all(&mut self) -> String {
        let joined = self.fragments.concat();
        self.fragments.clear();
        joined
    }

    /// Discard without draining (aborted turn or session reset).
    pub fn clear(&mut self) {
        self.fragments.clear();
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}
