//! Completeness of transcript entries and the static/dynamic split.
//!
//! An entry is complete when its content will not change again. The static
//! prefix is the longest run of complete entries starting at index 0; a later
//! entry is never promoted while an earlier one is still open.

use crate::protocol::{ApiRequestInfo, ChatMessage, ChatMessageType, UnifiedMessage, API_REQ_STARTED};

/// Whether one transcript entry is final.
pub fn is_message_complete(message: &UnifiedMessage) -> bool {
    match message {
        UnifiedMessage::Frontend(entry) => entry.partial != Some(true),
        UnifiedMessage::Backend(entry) => is_chat_message_complete(entry),
    }
}

/// Completeness rules for an extension-authored entry.
pub fn is_chat_message_complete(message: &ChatMessage) -> bool {
    if message.is_partial() {
        return false;
    }
    // The request indicator is rewritten in place once the request settles.
    if message.say.as_deref() == Some(API_REQ_STARTED) {
        return ApiRequestInfo::parse(message.text.as_deref()).has_terminal_outcome();
    }
    if message.kind == ChatMessageType::Ask {
        return message.is_answered == Some(true);
    }
    true
}

/// Number of entries in the static prefix.
pub fn static_boundary(messages: &[UnifiedMessage]) -> usize {
    messages
        .iter()
        .take_while(|message| is_message_complete(message))
        .count()
}

/// Split into the immutable prefix and the still-mutating suffix.
pub fn split_messages(messages: &[UnifiedMessage]) -> (&[UnifiedMessage], &[UnifiedMessage]) {
    messages.split_at(static_boundary(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrontendMessage;

    fn say(ts: u64, text: &str) -> UnifiedMessage {
        UnifiedMessage::Backend(ChatMessage::say(ts, "text", text))
    }

    fn partial_say(ts: u64, text: &str) -> UnifiedMessage {
        UnifiedMessage::Backend(ChatMessage::say(ts, "text", text).partial(true))
    }

    fn api_req(ts: u64, text: &str) -> UnifiedMessage {
        UnifiedMessage::Backend(ChatMessage::say(ts, API_REQ_STARTED, text).partial(false))
    }

    fn ask(ts: u64, answered: Option<bool>, partial: Option<bool>) -> ChatMessage {
        let mut message = ChatMessage::ask(ts, "followup", "which?");
        message.is_answered = answered;
        message.partial = partial;
        message
    }

    #[test]
    fn frontend_entries_follow_their_partial_flag() {
        let mut local = FrontendMessage::new("l1", "user", "hi", 1);
        assert!(is_message_complete(&UnifiedMessage::Frontend(local.clone())));
        local.partial = Some(false);
        assert!(is_message_complete(&UnifiedMessage::Frontend(local.clone())));
        local.partial = Some(true);
        assert!(!is_message_complete(&UnifiedMessage::Frontend(local)));
    }

    #[test]
    fn partial_backend_entries_are_never_complete() {
        assert!(!is_message_complete(&partial_say(1, "stream")));
        assert!(is_message_complete(&say(1, "done")));
    }

    #[test]
    fn ask_requires_an_answer_regardless_of_partial() {
        for partial in [None, Some(false), Some(true)] {
            for answered in [None, Some(false)] {
                assert!(!is_chat_message_complete(&ask(1, answered, partial)));
            }
        }
        assert!(is_chat_message_complete(&ask(1, Some(true), None)));
        assert!(!is_chat_message_complete(&ask(1, Some(true), Some(true))));
    }

    #[test]
    fn api_request_needs_a_terminal_outcome() {
        assert!(!is_message_complete(&api_req(1, r#"{"request":"POST /v1"}"#)));
        assert!(!is_message_complete(&api_req(1, "not json")));
        assert!(is_message_complete(&api_req(1, r#"{"cost":0.0012}"#)));
        assert!(is_message_complete(&api_req(1, r#"{"cost":null}"#)));
        assert!(is_message_complete(&api_req(1, r#"{"cancelReason":"user_cancelled"}"#)));
        assert!(is_message_complete(&api_req(1, r#"{"streamingFailedMessage":"429"}"#)));
    }

    #[test]
    fn split_stops_at_first_incomplete_entry() {
        let transcript = vec![say(1, "a"), say(2, "b"), partial_say(3, "c"), say(4, "d")];
        let (done, live) = split_messages(&transcript);
        assert_eq!(done.len(), 2);
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].ts(), 3);
    }

    #[test]
    fn split_with_incomplete_head_is_fully_dynamic() {
        let transcript = vec![partial_say(1, "a"), say(2, "b")];
        assert_eq!(static_boundary(&transcript), 0);
        assert_eq!(static_boundary(&[]), 0);
    }

    #[test]
    fn boundary_grows_as_entries_complete() {
        let mut transcript = vec![say(1, "a"), partial_say(2, "b")];
        assert_eq!(static_boundary(&transcript), 1);
        transcript[1] = say(2, "b!");
        assert_eq!(static_boundary(&transcript), 2);
        transcript.push(UnifiedMessage::Backend(ask(3, Some(false), None)));
        assert_eq!(static_boundary(&transcript), 2);
        transcript[2] = UnifiedMessage::Backend(ask(3, Some(true), None));
        assert_eq!(static_boundary(&transcript), 3);
    }

    #[test]
    fn boundary_never_decreases_across_a_streamed_turn() {
        enum Step {
            Append(UnifiedMessage),
            Replace(usize, UnifiedMessage),
        }

        let steps = vec![
            Step::Append(UnifiedMessage::Frontend(FrontendMessage::new("u1", "user", "go", 1))),
            Step::Append(api_req(2, r#"{"request":"POST /v1"}"#)),
            Step::Append(partial_say(3, "Ech")),
            Step::Replace(2, partial_say(3, "Echo: go")),
            Step::Append(UnifiedMessage::Backend(ask(4, None, Some(true)))),
            Step::Replace(2, say(3, "Echo: go")),
            Step::Replace(1, api_req(2, r#"{"cost":0.01}"#)),
            Step::Replace(3, UnifiedMessage::Backend(ask(4, Some(false), Some(false)))),
            Step::Append(say(5, "after")),
            Step::Replace(3, UnifiedMessage::Backend(ask(4, Some(true), Some(false)))),
            Step::Append(partial_say(6, "next")),
        ];
        let expected = [1, 1, 1, 1, 1, 1, 3, 3, 3, 5, 5];

        let mut transcript = Vec::new();
        let mut last = 0;
        for (step, want) in steps.into_iter().zip(expected) {
            match step {
                Step::Append(entry) => transcript.push(entry),
                Step::Replace(idx, entry) => transcript[idx] = entry,
            }
            let boundary = static_boundary(&transcript);
            assert!(boundary >= last, "boundary went from {last} to {boundary}");
            assert_eq!(boundary, want);
            last = boundary;
        }
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn boundary_never_decreases_for_append_only_completing_streams(
                steps in proptest::collection::vec((any::<bool>(), 0usize..8), 1..40)
            ) {
                // Each step either appends an open entry or closes one existing entry.
                let mut transcript: Vec<UnifiedMessage> = Vec::new();
                let mut last = 0;
                for (ts, (append, pick)) in steps.into_iter().enumerate() {
                    if append || transcript.is_empty() {
                        transcript.push(partial_say(ts as u64, "x"));
                    } else {
                        let idx = pick % transcript.len();
                        let entry_ts = transcript[idx].ts();
                        transcript[idx] = say(entry_ts, "x");
                    }
                    let boundary = static_boundary(&transcript);
                    prop_assert!(boundary >= last);
                    prop_assert!(boundary <= transcript.len());
                    last = boundary;
                }
            }
        }
    }
}
