//! Commands the terminal session understands out of the box.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use super::{
    Argument, ArgumentValue, Command, CommandRegistry, ParsedCommand, Validation, ValuesProvider,
};
use crate::protocol::CustomMode;

const DEFAULT_MODES: [(&str, &str); 5] = [
    ("architect", "Plan and design system architecture"),
    ("code", "Write, modify, and refactor code"),
    ("ask", "Get explanations and answers"),
    ("debug", "Troubleshoot and fix issues"),
    ("orchestrator", "Coordinate complex multi-step projects"),
];

fn default_modes() -> Vec<ArgumentValue> {
    DEFAULT_MODES
        .iter()
        .map(|(slug, description)| ArgumentValue::described(*slug, *description))
        .collect()
}

/// Modes available for `/mode`, kept current from extension state.
pub struct ModeCatalog {
    tx: watch::Sender<Vec<ArgumentValue>>,
}

impl Default for ModeCatalog {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(default_modes());
        Self { tx }
    }
}

impl ModeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in modes followed by the extension's custom modes.
    pub fn publish(&self, custom: &[CustomMode]) {
        let mut modes = default_modes();
        for mode in custom {
            if modes.iter().any(|known| known.value == mode.slug) {
                continue;
            }
            modes.push(ArgumentValue {
                value: mode.slug.clone(),
                description: mode.name.clone(),
            });
        }
        self.tx.send_replace(modes);
    }

    pub fn current(&self) -> Vec<ArgumentValue> {
        self.tx.borrow().clone()
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.tx
            .borrow()
            .iter()
            .any(|mode| mode.value.eq_ignore_ascii_case(slug))
    }

    pub fn values(&self) -> ModeValues {
        ModeValues {
            rx: self.tx.subscribe(),
        }
    }
}

/// Provider reading the latest published modes.
#[derive(Clone)]
pub struct ModeValues {
    rx: watch::Receiver<Vec<ArgumentValue>>,
}

impl ModeValues {
    fn validate(&self, value: &str) -> Validation {
        let modes = self.rx.borrow();
        if modes.iter().any(|mode| mode.value.eq_ignore_ascii_case(value)) {
            return Validation::ok();
        }
        let available: Vec<&str> = modes.iter().map(|mode| mode.value.as_str()).collect();
        Validation::fail(format!("Invalid mode. Available: {}", available.join(", ")))
    }
}

#[async_trait]
impl ValuesProvider for ModeValues {
    async fn values(&self) -> Vec<ArgumentValue> {
        self.rx.borrow().clone()
    }
}

/// Built-in command set in display order.
pub fn builtin_commands(modes: &ModeCatalog) -> Vec<Command> {
    let mode_values = modes.values();
    let validator = mode_values.clone();
    vec![
        Command::new("help", "List available commands").alias("h"),
        Command::new("mode", "Switch to a different mode")
            .alias("m")
            .usage("/mode <mode-name>")
            .category("settings")
            .argument(
                Argument::new("mode-name")
                    .description("The mode to switch to")
                    .required()
                    .provider(Arc::new(mode_values))
                    .validator(move |value| validator.validate(value)),
            ),
        Command::new("new", "Start a new task")
            .alias("n")
            .usage("/new [prompt]")
            .category("chat"),
        Command::new("clear", "Clear the current task and transcript").alias("c"),
        Command::new("exit", "Exit the session").alias("quit").alias("q"),
    ]
}

/// Session-level meaning of a resolved command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinAction {
    Help,
    Mode(Option<String>),
    NewTask(Option<String>),
    Clear,
    Exit,
    Unknown(String),
}

/// Resolve parsed input against the registry.
pub fn builtin_action(parsed: &ParsedCommand, registry: &CommandRegistry) -> BuiltinAction {
    let Some(command) = registry.find(&parsed.name) else {
        return BuiltinAction::Unknown(parsed.name.clone());
    };
    match command.name.as_str() {
        "help" => BuiltinAction::Help,
        "mode" => BuiltinAction::Mode(parsed.args.first().map(|arg| arg.to_ascii_lowercase())),
        "new" => {
            let prompt = parsed.args.join(" ");
            BuiltinAction::NewTask((!prompt.is_empty()).then_some(prompt))
        }
        "clear" => BuiltinAction::Clear,
        "exit" => BuiltinAction::Exit,
        other => BuiltinAction::Unknown(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{parse_command_input, validate_arguments};
    use serde_json::Map;

    fn registry(modes: &ModeCatalog) -> CommandRegistry {
        CommandRegistry::from_commands(builtin_commands(modes))
    }

    #[test]
    fn every_builtin_registers() {
        let modes = ModeCatalog::new();
        assert_eq!(registry(&modes).len(), 5);
    }

    #[tokio::test]
    async fn published_custom_modes_reach_the_provider() {
        let modes = ModeCatalog::new();
        let values = modes.values();
        modes.publish(&[CustomMode {
            slug: "translate".to_string(),
            name: Some("Translate".to_string()),
            extra: Map::new(),
        }]);
        let slugs: Vec<String> = values.values().await.into_iter().map(|v| v.value).collect();
        assert_eq!(slugs.len(), 6);
        assert_eq!(slugs.last().map(String::as_str), Some("translate"));
        assert!(modes.contains("Translate"));
    }

    #[test]
    fn mode_argument_validates_against_current_modes() {
        let modes = ModeCatalog::new();
        let registry = registry(&modes);
        let mode = registry.find("m").expect("mode command");
        assert!(validate_arguments(&mode, &["CODE".to_string()]).valid);
        let rejected = validate_arguments(&mode, &["translate".to_string()]);
        assert!(!rejected.valid);
        assert!(rejected
            .error
            .as_deref()
            .is_some_and(|error| error.starts_with("Invalid mode. Available: architect, code")));
    }

    #[test]
    fn actions_resolve_through_aliases() {
        let modes = ModeCatalog::new();
        let registry = registry(&modes);
        let action = |input: &str| {
            builtin_action(&parse_command_input(input).expect("command"), &registry)
        };
        assert_eq!(action("/q"), BuiltinAction::Exit);
        assert_eq!(action("/m Ask"), BuiltinAction::Mode(Some("ask".to_string())));
        assert_eq!(
            action("/new fix the build"),
            BuiltinAction::NewTask(Some("fix the build".to_string()))
        );
        assert_eq!(action("/new"), BuiltinAction::NewTask(None));
        assert_eq!(action("/bogus"), BuiltinAction::Unknown("bogus".to_string()));
    }
}
