//! Turn and UI-message history
//!
//! Two ordered, append-only views of the same conversation: the model's own
//! turns (what gets replayed into the model) and the rendered UI messages
//! (what a reconnecting client replays). They live together in one
//! [`HistoryState`] behind a single lock so a commit touches both exactly
//! once per completed turn, or not at all, and snapshot readers never observe
//! a torn sequence.

use lantern_model::Turn;
use lantern_protocol::UiMessage;

use crate::pending_log::PendingOutputLog;

/// User input used to kick off a brand-new session automatically.
pub const BOOTSTRAP_PROMPT: &str = "Hello";

/// The synthetic first UI message a fresh process records.
pub fn bootstrap_message() -> UiMessage {
    UiMessage::user(BOOTSTRAP_PROMPT)
}

/// Ordered list of completed model turns.
#[derive(Debug, Default)]
pub struct TurnStore {
    turns: Vec<Turn>,
}

impl TurnStore {
    pub fn commit(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.turns.extend(turns);
    }

    /// Seed the store wholesale from prior state.
    pub fn replace_all(&mut self, turns: Vec<Turn>) {
        self.turns = turns;
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    /// Copy-on-read view; stays consistent if a commit lands after it.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Ordered list of rendered UI messages.
#[derive(Debug, Default)]
pub struct UiMessageStore {
    messages: Vec<UiMessage>,
}

impl UiMessageStore {
    pub fn commit(&mut self, messages: impl IntoIterator<Item = UiMessage>) {
        self.messages.extend(messages);
    }

    /// Seed the store wholesale from prior state.
    pub fn replace_all(&mut self, messages: Vec<UiMessage>) {
        self.messages = messages;
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Copy-on-read view; stays consistent if a commit lands after it.
    #[allow(dead_code)]
    pub fn snapshot(&self) -> Vec<UiMessage> {
        self.messages.clone()
    }

    /// History as replayed to a newly admitted connection. The synthetic
    /// bootstrap message is elided if and only if it is the first message in
    /// the stored sequence, so a restored session never shows the artificial
    /// kickoff to the user.
    pub fn replay(&self) -> Vec<UiMessage> {
        let skip = usize::from(self.messages.first() == Some(&bootstrap_message()));
        self.messages[skip..].to_vec()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Everything one turn commit touches, guarded by a single outer lock.
#[derive(Debug, Default)]
pub struct HistoryState {
    pub turns: TurnStore,
    pub ui: UiMessageStore,
    pub pending: PendingOutputLog,
}

impl HistoryState {
    pub fn new() -> Self {
        Self {
            turns: TurnStore::default(),
            ui: UiMessageStore::default(),
            pending: PendingOutputLog::new(),
        }
    }

    /// Prepare for a fresh turn: drop any raw fragments an aborted
    /// predecessor left behind.
    pub fn begin_turn(&mut self) {
        self.pending.clear();
    }

    /// Commit one completed turn atomically: the user/assistant model turns
    /// and UI messages, both derived from the drained raw output. The turns
    /// are built from state this store owns, never from the model client's
    /// shared memory — a stale stream ending late cannot alter what gets
    /// committed here. Returns the assistant message as committed.
    pub fn commit_turn(&mut self, user_input: &str) -> UiMessage {
        let raw = self.pending.drain_all();
        let assistant = UiMessage::assistant(raw.clone());
        self.turns
            .commit([Turn::user(user_input), Turn::assistant(raw)]);
        self.ui
            .commit([UiMessage::user(user_input), assistant.clone()]);
        assistant
    }

    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Replace all history wholesale: seed from prior state, or wipe.
    pub fn restore(&mut self, turns: Vec<Turn>, messages: Vec<UiMessage>) {
        self.turns.replace_all(turns);
        self.ui.replace_all(messages);
        self.pending.clear();
    }

    /// Wipe all history (the external "new session" request).
    pub fn reset_all(&mut self) {
        self.restore(Vec::new(), Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_protocol::Role;

    #[test]
    fn bootstrap_is_elided_only_when_first() {
        let mut store = UiMessageStore::default();
        store.commit([bootstrap_message(), UiMessage::assistant("hi there")]);
        let replay = store.replay();
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].role, Role::Assistant);
    }

    #[test]
    fn identical_hello_later_in_history_is_replayed() {
        let mut store = UiMessageStore::default();
        store.commit([
            bootstrap_message(),
            UiMessage::assistant("greetings"),
            // The user really typed "Hello" this time.
            UiMessage::user(BOOTSTRAP_PROMPT),
            UiMessage::assistant("hello again"),
        ]);
        let replay = store.replay();
        assert_eq!(replay.len(), 3);
        assert_eq!(replay[1], bootstrap_message());
    }

    #[test]
    fn replay_of_history_without_bootstrap_is_verbatim() {
        let mut store = UiMessageStore::default();
        store.commit([UiMessage::user("direct"), UiMessage::assistant("reply")]);
        assert_eq!(store.replay(), store.snapshot());
    }

    #[test]
    fn replay_of_empty_store_is_empty() {
        let store = UiMessageStore::default();
        assert!(store.replay().is_empty());
    }

    #[test]
    fn snapshot_is_isolated_from_later_commits() {
        let mut store = TurnStore::default();
        store.commit([Turn::user("a")]);
        let snap = store.snapshot();
        store.commit([Turn::assistant("b")]);
        assert_eq!(snap.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn commit_turn_drains_pending_and_updates_both_stores() {
        let mut history = HistoryState::new();
        history.begin_turn();
        history.pending.append("he");
        history.pending.append("llo");

        let assistant = history.commit_turn("hi");

        assert_eq!(assistant.content, "hello");
        assert!(history.pending.is_empty());
        assert_eq!(
            history.turns.snapshot(),
            vec![Turn::user("hi"), Turn::assistant("hello")]
        );
        assert_eq!(
            history.ui.snapshot(),
            vec![UiMessage::user("hi"), UiMessage::assistant("hello")]
        );
    }

    #[test]
    fn committed_turns_come_from_the_pending_log_alone() {
        let mut history = HistoryState::new();
        history.begin_turn();
        history.pending.append("fresh");
        let assistant = history.commit_turn("ask");
        assert_eq!(assistant.content, "fresh");
        // Only the pair built from this turn's own drain lands in the store.
        assert_eq!(
            history.turns.snapshot(),
            vec![Turn::user("ask"), Turn::assistant("fresh")]
        );
    }

    #[test]
    fn empty_turn_commits_empty_assistant_message() {
        let mut history = HistoryState::new();
        history.begin_turn();
        let assistant = history.commit_turn("");
        assert_eq!(assistant, UiMessage::assistant(""));
        assert_eq!(history.turns.len(), 2);
        assert_eq!(history.ui.snapshot().len(), 2);
    }

    #[test]
    fn begin_turn_drops_fragments_from_an_aborted_predecessor() {
        let mut history = HistoryState::new();
        history.pending.append("stale");
        history.begin_turn();
        assert!(history.pending.is_empty());
    }

    #[test]
    fn reset_all_clears_everything() {
        let mut history = HistoryState::new();
        history.pending.append("x");
        history.commit_turn("a");
        history.reset_all();
        assert!(history.turns.is_empty());
        assert!(history.ui.is_empty());
        assert!(history.pending.is_empty());
    }

    #[test]
    fn restore_seeds_both_stores_from_prior_state() {
        let mut history = HistoryState::new();
        history.pending.append("stale");
        history.restore(
            vec![Turn::user(BOOTSTRAP_PROMPT), Turn::assistant("hi!")],
            vec![bootstrap_message(), UiMessage::assistant("hi!")],
        );
        assert!(history.pending.is_empty());
        assert_eq!(history.turns.len(), 2);
        // A restored session replays without the artificial kickoff.
        assert_eq!(history.ui.replay(), vec![UiMessage::assistant("hi!")]);
    }
}
