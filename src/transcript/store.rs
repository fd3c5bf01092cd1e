//! Front end transcript store fed by extension messages.

use std::collections::{HashMap, HashSet};

use crate::protocol::{
    kinds, ChatMessage, ExtensionMessage, ExtensionState, FrontendMessage, MessageKey,
    UnifiedMessage,
};

use super::completion::static_boundary;

/// Narrow consumer of the extension's state stream.
pub trait StateConsumer {
    /// Accept a full state snapshot.
    fn apply_state(&mut self, state: ExtensionState);

    /// Accept one new or updated transcript entry.
    fn apply_message(&mut self, message: ChatMessage);

    /// Route a raw extension message. Kinds without transcript meaning are
    /// ignored.
    fn apply_extension_message(&mut self, message: &ExtensionMessage) {
        match message.kind() {
            kinds::STATE => match message.as_state() {
                Some(state) => self.apply_state(state),
                None => tracing::warn!("ignoring malformed state snapshot"),
            },
            kinds::MESSAGE_UPDATED => match message.as_updated_message() {
                Some(entry) => self.apply_message(entry),
                None => tracing::warn!("ignoring malformed messageUpdated payload"),
            },
            other => tracing::trace!(kind = other, "extension message not used by transcript"),
        }
    }
}

/// Reconciled view of the conversation.
///
/// Snapshots decide which backend entries exist; incremental updates carry
/// the freshest content of streaming entries. A final entry never goes back
/// to partial.
#[derive(Debug, Default)]
pub struct Transcript {
    state: Option<ExtensionState>,
    messages: Vec<ChatMessage>,
    versions: HashMap<u64, usize>,
    streaming: HashSet<u64>,
    local: Vec<FrontendMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last snapshot with its transcript moved out into [`Self::messages`].
    pub fn state(&self) -> Option<&ExtensionState> {
        self.state.as_ref()
    }

    pub fn mode(&self) -> Option<&str> {
        self.state.as_ref().map(|state| state.mode.as_str())
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_streaming(&self, ts: u64) -> bool {
        self.streaming.contains(&ts)
    }

    pub fn add_local(&mut self, message: FrontendMessage) {
        self.local.push(message);
    }

    /// Replace the content of a local entry. Returns false for unknown ids.
    pub fn update_local(&mut self, id: &str, content: &str, partial: Option<bool>) -> bool {
        match self.local.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.content = content.to_string();
                entry.partial = partial;
                true
            }
            None => false,
        }
    }

    /// Drop every entry, local and backend.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.versions.clear();
        self.streaming.clear();
        self.local.clear();
    }

    /// Local and backend entries merged chronologically. On equal
    /// timestamps the local entry comes first.
    pub fn unified(&self) -> Vec<UnifiedMessage> {
        let mut merged: Vec<UnifiedMessage> = self
            .local
            .iter()
            .cloned()
            .map(UnifiedMessage::Frontend)
            .chain(self.messages.iter().cloned().map(UnifiedMessage::Backend))
            .collect();
        merged.sort_by_key(UnifiedMessage::ts);
        merged
    }

    pub fn static_len(&self) -> usize {
        static_boundary(&self.unified())
    }

    fn track(&mut self, message: &ChatMessage) {
        self.versions.insert(message.ts, message.content_weight());
        if message.is_partial() {
            self.streaming.insert(message.ts);
        } else {
            self.streaming.remove(&message.ts);
        }
    }
}

/// Merge a partial update into an existing entry without losing the answered
/// flag the front end already observed.
fn carry_answer(existing: &ChatMessage, mut incoming: ChatMessage) -> ChatMessage {
    if existing.is_answered == Some(true) && incoming.is_answered.is_none() {
        incoming.is_answered = Some(true);
    }
    incoming
}

fn regresses(existing: &ChatMessage, incoming: &ChatMessage) -> bool {
    !existing.is_partial() && incoming.is_partial()
}

impl StateConsumer for Transcript {
    fn apply_state(&mut self, mut state: ExtensionState) {
        let incoming = std::mem::take(&mut state.cline_messages);
        let current: HashMap<u64, &ChatMessage> =
            self.messages.iter().map(|entry| (entry.ts, entry)).collect();

        let mut reconciled: Vec<ChatMessage> = incoming
            .into_iter()
            .map(|entry| {
                let Some(existing) = current.get(&entry.ts).copied() else {
                    return entry;
                };
                if regresses(existing, &entry) {
                    return existing.clone();
                }
                let streaming_longer = existing.is_partial()
                    && self.streaming.contains(&entry.ts)
                    && self.versions.get(&entry.ts).copied().unwrap_or(0)
                        > entry.content_weight();
                if streaming_longer {
                    return existing.clone();
                }
                carry_answer(existing, entry)
            })
            .collect();
        reconciled.sort_by_key(|entry| entry.ts);

        self.versions.clear();
        self.streaming.clear();
        for entry in &reconciled {
            self.track(entry);
        }
        self.messages = reconciled;
        self.state = Some(state);
    }

    fn apply_message(&mut self, message: ChatMessage) {
        let position = self.messages.iter().rposition(|entry| entry.ts == message.ts);
        match position {
            Some(idx) => {
                let existing = &self.messages[idx];
                if regresses(existing, &message) {
                    tracing::debug!(ts = message.ts, "ignoring partial update of a final entry");
                    return;
                }
                let current = self.versions.get(&message.ts).copied().unwrap_or(0);
                let answer_changed = message.is_answered != existing.is_answered
                    && message.is_answered.is_some();
                if message.is_partial()
                    || message.content_weight() > current
                    || existing.is_partial()
                    || answer_changed
                {
                    let merged = carry_answer(existing, message);
                    self.track(&merged);
                    self.messages[idx] = merged;
                }
            }
            None => {
                // Not yet in a snapshot: insert in timestamp order.
                let idx = self.messages.partition_point(|entry| entry.ts <= message.ts);
                self.track(&message);
                self.messages.insert(idx, message);
            }
        }
    }
}

/// Tracks which entries have been committed to append-only output.
///
/// Entries are remembered by key, so a late arrival that sorts before an
/// already committed entry is still emitted once and nothing is repeated.
#[derive(Debug, Default)]
pub struct RenderCursor {
    committed: HashSet<MessageKey>,
}

impl RenderCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed(&self) -> usize {
        self.committed.len()
    }

    /// Static entries not returned by an earlier call, in transcript order.
    pub fn advance<'a>(&mut self, transcript: &'a [UnifiedMessage]) -> Vec<&'a UnifiedMessage> {
        let boundary = static_boundary(transcript);
        transcript[..boundary]
            .iter()
            .filter(|entry| self.committed.insert(entry.key()))
            .collect()
    }

    /// Start over, e.g. after the task is cleared.
    pub fn reset(&mut self) {
        self.committed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming(ts: u64, text: &str) -> ChatMessage {
        ChatMessage::say(ts, "text", text).partial(true)
    }

    fn done(ts: u64, text: &str) -> ChatMessage {
        ChatMessage::say(ts, "text", text).partial(false)
    }

    fn snapshot(messages: Vec<ChatMessage>) -> ExtensionState {
        ExtensionState {
            mode: "code".to_string(),
            cline_messages: messages,
            ..ExtensionState::default()
        }
    }

    #[test]
    fn updates_replace_entries_with_the_same_ts() {
        let mut transcript = Transcript::new();
        transcript.apply_message(streaming(1, "Hel"));
        transcript.apply_message(streaming(1, "Hello"));
        transcript.apply_message(done(1, "Hello world"));
        assert_eq!(transcript.messages().len(), 1);
        assert_eq!(transcript.messages()[0].text.as_deref(), Some("Hello world"));
        assert!(!transcript.is_streaming(1));
    }

    #[test]
    fn final_entries_never_return_to_partial() {
        let mut transcript = Transcript::new();
        transcript.apply_message(done(1, "final"));
        transcript.apply_message(streaming(1, "fin"));
        assert!(!transcript.messages()[0].is_partial());

        transcript.apply_state(snapshot(vec![streaming(1, "fi")]));
        assert!(!transcript.messages()[0].is_partial());
        assert_eq!(transcript.messages()[0].text.as_deref(), Some("final"));
    }

    #[test]
    fn snapshot_keeps_longer_streaming_content() {
        let mut transcript = Transcript::new();
        transcript.apply_state(snapshot(vec![done(1, "hi"), streaming(2, "a")]));
        transcript.apply_message(streaming(2, "a longer chunk"));
        transcript.apply_state(snapshot(vec![done(1, "hi"), streaming(2, "a lo")]));
        assert_eq!(transcript.messages()[1].text.as_deref(), Some("a longer chunk"));
        assert_eq!(transcript.mode(), Some("code"));
    }

    #[test]
    fn snapshot_decides_which_entries_exist() {
        let mut transcript = Transcript::new();
        transcript.apply_message(done(1, "old"));
        transcript.apply_state(snapshot(vec![done(5, "b"), done(3, "a")]));
        let ts: Vec<u64> = transcript.messages().iter().map(|entry| entry.ts).collect();
        assert_eq!(ts, vec![3, 5]);
    }

    #[test]
    fn unknown_ts_updates_are_inserted_in_order() {
        let mut transcript = Transcript::new();
        transcript.apply_message(done(10, "b"));
        transcript.apply_message(done(5, "a"));
        let ts: Vec<u64> = transcript.messages().iter().map(|entry| entry.ts).collect();
        assert_eq!(ts, vec![5, 10]);
    }

    #[test]
    fn answered_flag_survives_a_later_update_without_it() {
        let mut transcript = Transcript::new();
        transcript.apply_message(ChatMessage::ask(1, "followup", "which?").answered(true));
        transcript.apply_message(ChatMessage::ask(1, "followup", "which? (edited)"));
        assert_eq!(transcript.messages()[0].is_answered, Some(true));
    }

    #[test]
    fn local_entries_merge_chronologically() {
        let mut transcript = Transcript::new();
        transcript.apply_message(done(10, "reply"));
        transcript.add_local(FrontendMessage::new("u1", "user", "question", 5));
        transcript.add_local(FrontendMessage::new("u2", "system", "note", 20));
        let order: Vec<u64> = transcript.unified().iter().map(UnifiedMessage::ts).collect();
        assert_eq!(order, vec![5, 10, 20]);
        assert!(transcript.update_local("u2", "edited", Some(true)));
        assert!(!transcript.update_local("missing", "x", None));
        assert_eq!(transcript.static_len(), 2);
    }

    #[test]
    fn apply_extension_message_routes_by_kind() {
        let mut transcript = Transcript::new();
        transcript.apply_extension_message(&ExtensionMessage::state(&snapshot(vec![done(1, "a")])));
        transcript.apply_extension_message(&ExtensionMessage::message_updated(&done(2, "b")));
        transcript.apply_extension_message(&ExtensionMessage::new("invoke"));
        transcript.apply_extension_message(&ExtensionMessage::new(kinds::STATE));
        assert_eq!(transcript.messages().len(), 2);
    }

    #[test]
    fn cursor_commits_each_static_entry_once() {
        let mut transcript = Transcript::new();
        let mut cursor = RenderCursor::new();

        transcript.apply_message(streaming(1, "par"));
        assert!(cursor.advance(&transcript.unified()).is_empty());

        transcript.apply_message(done(1, "partial no more"));
        transcript.apply_message(streaming(2, "next"));
        let unified = transcript.unified();
        let fresh = cursor.advance(&unified);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].ts(), 1);
        assert!(cursor.advance(&unified).is_empty());
        assert_eq!(cursor.committed(), 1);

        cursor.reset();
        assert_eq!(cursor.committed(), 0);
    }

    #[test]
    fn cursor_emits_late_earlier_entries_without_repeats() {
        let mut transcript = Transcript::new();
        let mut cursor = RenderCursor::new();
        transcript.apply_message(done(10, "second"));
        assert_eq!(cursor.advance(&transcript.unified()).len(), 1);

        transcript.apply_message(done(5, "first"));
        let unified = transcript.unified();
        let fresh = cursor.advance(&unified);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].ts(), 5);
        assert_eq!(cursor.committed(), 2);
    }

    #[test]
    fn local_entry_wins_timestamp_ties() {
        let mut transcript = Transcript::new();
        transcript.add_local(FrontendMessage::new("u1", "user", "go", 7));
        transcript.apply_message(streaming(7, "reply"));
        let unified = transcript.unified();
        assert!(matches!(unified[0], UnifiedMessage::Frontend(_)));
        assert_eq!(transcript.static_len(), 1);
    }
}
