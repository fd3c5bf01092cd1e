use std::sync::Arc;

use super::{Command, COMMAND_PREFIX};

/// Ordered, immutable-after-construction set of command definitions.
#[derive(Debug, Default, Clone)]
pub struct CommandRegistry {
    commands: Vec<Arc<Command>>,
}

fn is_well_formed_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(char::is_whitespace) && !name.contains(COMMAND_PREFIX)
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from definitions, skipping malformed ones.
    pub fn from_commands(commands: impl IntoIterator<Item = Command>) -> Self {
        let mut registry = Self::new();
        for command in commands {
            registry.register(command);
        }
        registry
    }

    /// Add one definition. Malformed or clashing definitions are logged and
    /// skipped; returns whether the command was added.
    pub fn register(&mut self, command: Command) -> bool {
        if !is_well_formed_name(&command.name) {
            tracing::warn!(name = %command.name, "skipping command with malformed name");
            return false;
        }
        if let Some(alias) = command.aliases.iter().find(|alias| !is_well_formed_name(alias)) {
            tracing::warn!(name = %command.name, alias = %alias, "skipping command with malformed alias");
            return false;
        }
        let clash = std::iter::once(&command.name)
            .chain(command.aliases.iter())
            .find(|candidate| self.find(candidate).is_some());
        if let Some(clash) = clash {
            tracing::warn!(name = %command.name, clash = %clash, "skipping duplicate command");
            return false;
        }
        self.commands.push(Arc::new(command));
        true
    }

    /// Look up by name or alias, ignoring ASCII case.
    pub fn find(&self, name: &str) -> Option<Arc<Command>> {
        self.commands
            .iter()
            .find(|command| command.answers_to(name))
            .cloned()
    }

    /// Definitions in registration order.
    pub fn commands(&self) -> &[Arc<Command>] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_and_duplicate_definitions_are_skipped() {
        let registry = CommandRegistry::from_commands([
            Command::new("help", "Show help"),
            Command::new("", "empty"),
            Command::new("two words", "spaces"),
            Command::new("/slash", "prefix inside"),
            Command::new("HELP", "duplicate name"),
            Command::new("exit", "Exit").alias("help"),
            Command::new("bad", "bad alias").alias("x y"),
            Command::new("mode", "Switch mode").alias("m"),
        ]);
        let names: Vec<&str> = registry
            .commands()
            .iter()
            .map(|command| command.name.as_str())
            .collect();
        assert_eq!(names, vec!["help", "mode"]);
    }

    #[test]
    fn find_resolves_aliases() {
        let registry = CommandRegistry::from_commands([Command::new("mode", "Switch").alias("m")]);
        assert_eq!(registry.find("M").map(|c| c.name.clone()), Some("mode".to_string()));
        assert!(registry.find("mo").is_none());
        assert_eq!(registry.len(), 1);
    }
}
