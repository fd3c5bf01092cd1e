//! Transcript completeness and the front end's reconciled view.
//!
//! [`split_messages`] decides which prefix of a chronological transcript is
//! final. [`Transcript`] consumes the extension's state stream and
//! [`RenderCursor`] hands each newly final entry to append-only output once.

mod completion;
mod store;

pub use completion::{is_chat_message_complete, is_message_complete, split_messages, static_boundary};
pub use store::{RenderCursor, StateConsumer, Transcript};
