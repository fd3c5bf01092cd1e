//! Terminal rendering for committed transcript entries.
//!
//! `RenderSink` is the contract the session drives; `Renderer` is the
//! crossterm-backed terminal implementation. Transcript entries go to stdout,
//! everything else to stderr.

use crossterm::style::{Color, Stylize};
use serde_json::Value;
use termhost::autocomplete::SuggestionResult;
use termhost::protocol::{ApiRequestInfo, ChatMessage, ChatMessageType, UnifiedMessage, API_REQ_STARTED};

const PROMPT_SYMBOL: &str = "›";
const INDENT: &str = "  ";

/// Visual role of one rendered transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tone {
    User,
    Assistant,
    Request,
    Question,
    Error,
    Other,
}

impl Tone {
    fn color(self) -> Color {
        match self {
            Self::User => Color::Cyan,
            Self::Assistant => Color::White,
            Self::Request => Color::DarkGrey,
            Self::Question => Color::Yellow,
            Self::Error => Color::Red,
            Self::Other => Color::Grey,
        }
    }
}

/// Text for one entry, or `None` when the entry renders as nothing.
pub(crate) fn format_entry(message: &UnifiedMessage) -> Option<(Tone, String)> {
    match message {
        UnifiedMessage::Frontend(entry) if entry.kind == "error" => {
            Some((Tone::Error, entry.content.clone()))
        }
        UnifiedMessage::Frontend(entry) => {
            Some((Tone::User, format!("{PROMPT_SYMBOL} {}", entry.content)))
        }
        UnifiedMessage::Backend(entry) => format_chat_message(entry),
    }
}

fn format_chat_message(message: &ChatMessage) -> Option<(Tone, String)> {
    let text = message.text.as_deref().unwrap_or_default().trim();
    match (message.kind, message.sub_kind()) {
        (ChatMessageType::Say, Some(API_REQ_STARTED)) => {
            let info = ApiRequestInfo::parse(message.text.as_deref());
            let line = match (
                info.cancel_reason.as_ref().and_then(value_text),
                info.streaming_failed_message.as_ref().and_then(value_text),
                info.cost.as_ref().and_then(value_text),
            ) {
                (Some(reason), _, _) => format!("API request cancelled ({reason})"),
                (_, Some(failure), _) => format!("API request failed: {failure}"),
                (_, _, Some(cost)) => format!("API request done (cost {cost})"),
                _ => "API request done".to_string(),
            };
            Some((Tone::Request, line))
        }
        (ChatMessageType::Say, Some("text")) if text.is_empty() => None,
        (ChatMessageType::Say, Some("text")) => Some((Tone::Assistant, text.to_string())),
        (ChatMessageType::Ask, Some("completion_result")) => Some((
            Tone::Question,
            "Task completed. Reply to continue or /new to start over.".to_string(),
        )),
        (ChatMessageType::Ask, _) if text.is_empty() => None,
        (ChatMessageType::Ask, _) => Some((Tone::Question, format!("? {text}"))),
        (ChatMessageType::Say, kind) if !text.is_empty() => Some((
            Tone::Other,
            format!("[{}] {text}", kind.unwrap_or("say")),
        )),
        _ => None,
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Injectable rendering interface used by the session.
pub(crate) trait RenderSink: Send + Sync {
    /// Render the input prompt.
    fn prompt(&self);
    /// Render one committed transcript entry.
    fn entry(&self, message: &UnifiedMessage);
    /// Render completion candidates for the current input.
    fn suggestions(&self, result: &SuggestionResult, max_visible: usize);
    fn status(&self, text: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

pub(crate) struct Renderer {
    color: bool,
}

impl Renderer {
    pub(crate) fn new(color: bool) -> Self {
        Self { color }
    }
}

impl RenderSink for Renderer {
    fn prompt(&self) {
        if self.color {
            eprint!("{} ", PROMPT_SYMBOL.with(Color::Cyan).bold());
        } else {
            eprint!("{PROMPT_SYMBOL} ");
        }
    }

    fn entry(&self, message: &UnifiedMessage) {
        let Some((tone, text)) = format_entry(message) else {
            return;
        };
        if self.color {
            println!("\r{}", text.with(tone.color()));
        } else {
            println!("\r{text}");
        }
    }

    fn suggestions(&self, result: &SuggestionResult, max_visible: usize) {
        let rows: Vec<(String, String)> = match result {
            SuggestionResult::Command(items) => items
                .iter()
                .take(max_visible)
                .map(|item| (format!("/{}", item.command.name), item.command.description.clone()))
                .collect(),
            SuggestionResult::Argument(items) => items
                .iter()
                .take(max_visible)
                .map(|item| (item.value.clone(), item.description.clone().unwrap_or_default()))
                .collect(),
            SuggestionResult::None => Vec::new(),
        };
        for (label, detail) in rows {
            if self.color {
                eprintln!("\r{INDENT}{} {}", label.with(Color::Cyan), detail.with(Color::DarkGrey));
            } else {
                eprintln!("\r{INDENT}{label} {detail}");
            }
        }
    }

    fn status(&self, text: &str) {
        if self.color {
            eprintln!("\r{}", text.with(Color::DarkGrey));
        } else {
            eprintln!("\r{text}");
        }
    }

    fn warn(&self, msg: &str) {
        if self.color {
            eprintln!("\r{} {msg}", "warning:".with(Color::Yellow).bold());
        } else {
            eprintln!("\rwarning: {msg}");
        }
    }

    fn error(&self, msg: &str) {
        if self.color {
            eprintln!("\r{} {msg}", "error:".with(Color::Red).bold());
        } else {
            eprintln!("\rerror: {msg}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termhost::protocol::FrontendMessage;

    fn backend(message: ChatMessage) -> UnifiedMessage {
        UnifiedMessage::Backend(message)
    }

    #[test]
    fn request_indicator_reports_its_outcome() {
        let done = backend(ChatMessage::say(1, API_REQ_STARTED, r#"{"cost":0.25}"#));
        assert_eq!(
            format_entry(&done),
            Some((Tone::Request, "API request done (cost 0.25)".to_string()))
        );
        let failed = backend(ChatMessage::say(
            2,
            API_REQ_STARTED,
            r#"{"streamingFailedMessage":"rate limited"}"#,
        ));
        assert_eq!(
            format_entry(&failed).map(|(_, text)| text),
            Some("API request failed: rate limited".to_string())
        );
    }

    #[test]
    fn empty_text_renders_nothing() {
        assert_eq!(format_entry(&backend(ChatMessage::say(1, "text", "  "))), None);
    }

    #[test]
    fn user_and_question_lines() {
        let user = UnifiedMessage::Frontend(FrontendMessage::new("u1", "user", "fix the build", 1));
        assert_eq!(
            format_entry(&user),
            Some((Tone::User, "› fix the build".to_string()))
        );
        let ask = backend(ChatMessage::ask(2, "followup", "Which file?"));
        assert_eq!(
            format_entry(&ask),
            Some((Tone::Question, "? Which file?".to_string()))
        );
        let tool = backend(ChatMessage::say(3, "command_output", "ok"));
        assert_eq!(
            format_entry(&tool).map(|(_, text)| text),
            Some("[command_output] ok".to_string())
        );
    }
}
