//! Slash-command definitions, parsing and argument validation.
//!
//! Definitions are built once into a [`CommandRegistry`] and stay immutable
//! for the life of the process. The autocomplete engine and the session loop
//! both read from the same registry.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

mod builtin;
mod registry;

pub use builtin::{builtin_action, builtin_commands, BuiltinAction, ModeCatalog, ModeValues};
pub use registry::CommandRegistry;

/// Character that starts a command on the input line.
pub const COMMAND_PREFIX: char = '/';

/// One candidate value for an argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentValue {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ArgumentValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: None,
        }
    }

    pub fn described(value: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: Some(description.into()),
        }
    }
}

/// Live source of argument values, e.g. the modes the extension publishes.
#[async_trait]
pub trait ValuesProvider: Send + Sync {
    async fn values(&self) -> Vec<ArgumentValue>;
}

#[derive(Clone, Default)]
pub enum ArgumentValues {
    #[default]
    Free,
    Static(Vec<ArgumentValue>),
    Dynamic(Arc<dyn ValuesProvider>),
}

impl ArgumentValues {
    pub async fn resolve(&self) -> Vec<ArgumentValue> {
        match self {
            Self::Free => Vec::new(),
            Self::Static(values) => values.clone(),
            Self::Dynamic(provider) => provider.values().await,
        }
    }
}

/// Result of validating one argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

pub type Validator = Arc<dyn Fn(&str) -> Validation + Send + Sync>;

#[derive(Clone)]
pub struct Argument {
    pub name: String,
    pub description: String,
    pub required: bool,
    pub values: ArgumentValues,
    pub validator: Option<Validator>,
}

impl Argument {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            required: false,
            values: ArgumentValues::Free,
            validator: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn values(mut self, values: Vec<ArgumentValue>) -> Self {
        self.values = ArgumentValues::Static(values);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ValuesProvider>) -> Self {
        self.values = ArgumentValues::Dynamic(provider);
        self
    }

    pub fn validator(mut self, validator: impl Fn(&str) -> Validation + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Run the validator. A panicking validator counts as a failed check.
    pub fn validate(&self, value: &str) -> Validation {
        let Some(validator) = &self.validator else {
            return Validation::ok();
        };
        match catch_unwind(AssertUnwindSafe(|| validator(value))) {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(argument = %self.name, "argument validator panicked");
                Validation::fail("validation failed")
            }
        }
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argument")
            .field("name", &self.name)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub usage: String,
    pub category: String,
    pub arguments: Vec<Argument>,
}

impl Command {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            description: description.to_string(),
            usage: format!("{COMMAND_PREFIX}{name}"),
            category: "system".to_string(),
            arguments: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn usage(mut self, usage: &str) -> Self {
        self.usage = usage.to_string();
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Case-insensitive match on the name or any alias.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name))
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

/// Split text into whitespace-separated tokens. A backslash escapes the
/// following whitespace or backslash. The flag reports whether the text ends
/// in unescaped whitespace.
pub(crate) fn tokenize(text: &str) -> (Vec<String>, bool) {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut trailing_space = false;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.peek() {
                Some(&next) if next.is_whitespace() || next == '\\' => {
                    current.push(next);
                    chars.next();
                }
                _ => current.push(ch),
            }
            trailing_space = false;
        } else if ch.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            trailing_space = true;
        } else {
            current.push(ch);
            trailing_space = false;
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    (tokens, trailing_space)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Parse `/name arg...`. Returns `None` for plain text.
pub fn parse_command_input(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim().strip_prefix(COMMAND_PREFIX)?;
    let (mut tokens, _) = tokenize(rest);
    if tokens.is_empty() || rest.starts_with(char::is_whitespace) {
        return Some(ParsedCommand {
            name: String::new(),
            args: tokens,
        });
    }
    let name = tokens.remove(0).to_ascii_lowercase();
    Some(ParsedCommand { name, args: tokens })
}

/// Check required arguments and run validators in order. The first failure
/// is returned.
pub fn validate_arguments(command: &Command, args: &[String]) -> Validation {
    for (idx, argument) in command.arguments.iter().enumerate() {
        match args.get(idx) {
            Some(value) => {
                let result = argument.validate(value);
                if !result.valid {
                    return result;
                }
            }
            None if argument.required => {
                return Validation::fail(format!("Missing required argument: {}", argument.name));
            }
            None => {}
        }
    }
    Validation::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_honors_escaped_whitespace() {
        assert_eq!(
            tokenize(r"open my\ file.txt "),
            (vec!["open".to_string(), "my file.txt".to_string()], true)
        );
        assert_eq!(tokenize(r"a\\ b"), (vec![r"a\".to_string(), "b".to_string()], false));
        assert_eq!(tokenize("x\\"), (vec!["x\\".to_string()], false));
        assert_eq!(tokenize(""), (Vec::new(), false));
    }

    #[test]
    fn parse_command_input_splits_name_and_args() {
        assert_eq!(
            parse_command_input("  /Mode architect "),
            Some(ParsedCommand {
                name: "mode".to_string(),
                args: vec!["architect".to_string()]
            })
        );
        assert_eq!(parse_command_input("hello /mode"), None);
        assert_eq!(
            parse_command_input("/"),
            Some(ParsedCommand {
                name: String::new(),
                args: Vec::new()
            })
        );
    }

    #[test]
    fn panicking_validator_reports_generic_failure() {
        let argument = Argument::new("x").validator(|_| panic!("validator bug"));
        assert_eq!(argument.validate("v"), Validation::fail("validation failed"));
    }

    #[test]
    fn validate_arguments_checks_required_and_validators() {
        let command = Command::new("mode", "Switch mode").argument(
            Argument::new("mode-name").required().validator(|value| {
                if value == "code" {
                    Validation::ok()
                } else {
                    Validation::fail("Invalid mode")
                }
            }),
        );
        assert_eq!(
            validate_arguments(&command, &[]),
            Validation::fail("Missing required argument: mode-name")
        );
        assert_eq!(
            validate_arguments(&command, &["nope".to_string()]),
            Validation::fail("Invalid mode")
        );
        assert!(validate_arguments(&command, &["code".to_string()]).valid);
    }

    #[tokio::test]
    async fn static_values_resolve_without_a_provider() {
        let values = ArgumentValues::Static(vec![ArgumentValue::new("a")]).resolve().await;
        assert_eq!(values, vec![ArgumentValue::new("a")]);
        assert!(ArgumentValues::Free.resolve().await.is_empty());
    }

    #[test]
    fn answers_to_name_and_alias_ignoring_case() {
        let command = Command::new("exit", "Exit").alias("q");
        assert!(command.answers_to("EXIT"));
        assert!(command.answers_to("Q"));
        assert!(!command.answers_to("ex"));
    }
}
