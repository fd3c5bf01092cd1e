//! Input-line autocomplete for slash commands and their arguments.
//!
//! The raw line is classified into one of three states:
//!
//! - `None`: empty, or not starting with `/`.
//! - `Command`: still typing the command name.
//! - `Argument`: a known command followed by whitespace.
//!
//! Command names and argument values match ASCII case-insensitively.

use std::cmp::Reverse;
use std::sync::Arc;

use crate::commands::{tokenize, ArgumentValue, Command, CommandRegistry, COMMAND_PREFIX};

/// Score of an exact name or alias match.
pub const EXACT_SCORE: u32 = 100;
const PREFIX_BASE: u32 = 50;
const PREFIX_SPAN: u32 = 49;

#[derive(Debug, Clone)]
pub enum InputState {
    None,
    Command {
        /// Name typed so far, possibly empty.
        name: String,
        /// Set when the name already resolves to a command.
        command: Option<Arc<Command>>,
    },
    Argument {
        command: Arc<Command>,
        /// Zero-based index of the argument being typed.
        index: usize,
        /// Value typed so far for that argument.
        partial: String,
        /// Arguments already completed before it.
        completed: Vec<String>,
    },
}

impl InputState {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Command { .. } => "command",
            Self::Argument { .. } => "argument",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandSuggestion {
    pub command: Arc<Command>,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentSuggestion {
    pub value: String,
    pub description: Option<String>,
    pub score: u32,
}

#[derive(Debug, Clone)]
pub enum SuggestionResult {
    Command(Vec<CommandSuggestion>),
    Argument(Vec<ArgumentSuggestion>),
    None,
}

impl SuggestionResult {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Argument(_) => "argument",
            Self::None => "none",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Command(suggestions) => suggestions.len(),
            Self::Argument(suggestions) => suggestions.len(),
            Self::None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Score `candidate` against `typed`. `None` means no match.
fn match_score(typed: &str, candidate: &str) -> Option<u32> {
    if candidate.eq_ignore_ascii_case(typed) {
        return Some(EXACT_SCORE);
    }
    let typed_len = typed.len();
    let candidate_len = candidate.len();
    if typed_len == 0 || typed_len >= candidate_len {
        return None;
    }
    let head = candidate.get(..typed_len)?;
    if !head.eq_ignore_ascii_case(typed) {
        return None;
    }
    Some(PREFIX_BASE + PREFIX_SPAN * typed_len as u32 / candidate_len as u32)
}

fn command_score(typed: &str, command: &Command) -> Option<u32> {
    std::iter::once(&command.name)
        .chain(command.aliases.iter())
        .filter_map(|candidate| match_score(typed, candidate))
        .max()
}

/// Byte index of the first whitespace not escaped by a backslash.
fn first_unescaped_whitespace(text: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
        } else if ch.is_whitespace() {
            return Some(idx);
        }
    }
    None
}

pub struct AutocompleteEngine {
    registry: Arc<CommandRegistry>,
}

impl AutocompleteEngine {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn detect_input_state(&self, input: &str) -> InputState {
        let Some(rest) = input.strip_prefix(COMMAND_PREFIX) else {
            return InputState::None;
        };
        let Some(split) = first_unescaped_whitespace(rest) else {
            return InputState::Command {
                name: rest.to_string(),
                command: self.registry.find(rest),
            };
        };
        let name = &rest[..split];
        let Some(command) = self.registry.find(name) else {
            return InputState::None;
        };
        let (mut tokens, trailing_space) = tokenize(&rest[split..]);
        let partial = if trailing_space {
            String::new()
        } else {
            tokens.pop().unwrap_or_default()
        };
        InputState::Argument {
            command,
            index: tokens.len(),
            partial,
            completed: tokens,
        }
    }

    /// Ranked command suggestions for the typed name.
    pub fn get_suggestions(&self, input: &str) -> Vec<CommandSuggestion> {
        let InputState::Command { name, .. } = self.detect_input_state(input) else {
            return Vec::new();
        };
        if name.is_empty() {
            return self
                .registry
                .commands()
                .iter()
                .map(|command| CommandSuggestion {
                    command: Arc::clone(command),
                    score: 0,
                })
                .collect();
        }
        let mut suggestions: Vec<CommandSuggestion> = self
            .registry
            .commands()
            .iter()
            .filter_map(|command| {
                command_score(&name, command).map(|score| CommandSuggestion {
                    command: Arc::clone(command),
                    score,
                })
            })
            .collect();
        // Stable sort keeps registration order for full ties.
        suggestions.sort_by_key(|suggestion| {
            (Reverse(suggestion.score), suggestion.command.name.len())
        });
        suggestions
    }

    /// Ranked values for the argument under the cursor.
    pub async fn get_argument_suggestions(&self, input: &str) -> Vec<ArgumentSuggestion> {
        let InputState::Argument {
            command,
            index,
            partial,
            ..
        } = self.detect_input_state(input)
        else {
            return Vec::new();
        };
        let Some(argument) = command.arguments.get(index) else {
            return Vec::new();
        };
        let values = argument.values.resolve().await;
        rank_values(values, &partial)
    }

    pub async fn get_all_suggestions(&self, input: &str) -> SuggestionResult {
        match self.detect_input_state(input) {
            InputState::None => SuggestionResult::None,
            InputState::Command { .. } => SuggestionResult::Command(self.get_suggestions(input)),
            InputState::Argument { .. } => {
                SuggestionResult::Argument(self.get_argument_suggestions(input).await)
            }
        }
    }
}

fn rank_values(values: Vec<ArgumentValue>, partial: &str) -> Vec<ArgumentSuggestion> {
    let mut suggestions: Vec<ArgumentSuggestion> = values
        .into_iter()
        .filter_map(|value| {
            let score = if partial.is_empty() {
                0
            } else {
                match_score(partial, &value.value)?
            };
            Some(ArgumentSuggestion {
                value: value.value,
                description: value.description,
                score,
            })
        })
        .collect();
    suggestions.sort_by_key(|suggestion| Reverse(suggestion.score));
    suggestions
}
