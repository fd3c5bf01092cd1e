//! Interactive session: turns typed lines into front end messages and
//! extension messages into committed transcript lines.

use std::sync::Arc;

use termhost::autocomplete::{AutocompleteEngine, SuggestionResult};
use termhost::commands::{
    builtin_action, builtin_commands, parse_command_input, validate_arguments, BuiltinAction,
    CommandRegistry, ModeCatalog, COMMAND_PREFIX,
};
use termhost::error::HostError;
use termhost::protocol::{ExtensionMessage, FrontendMessage, WebviewMessage};
use termhost::transcript::{RenderCursor, StateConsumer, Transcript};

use crate::app::render::RenderSink;

fn now_unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

/// Where front end messages go; the host in production.
pub(crate) type Outbox = Arc<dyn Fn(WebviewMessage) -> Result<(), HostError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Exit,
}

pub(crate) struct Session {
    outbox: Outbox,
    renderer: Arc<dyn RenderSink>,
    modes: ModeCatalog,
    registry: Arc<CommandRegistry>,
    engine: AutocompleteEngine,
    transcript: Transcript,
    cursor: RenderCursor,
    max_visible: usize,
    next_local_id: u64,
}

impl Session {
    pub(crate) fn new(outbox: Outbox, renderer: Arc<dyn RenderSink>, max_visible: usize) -> Self {
        let modes = ModeCatalog::new();
        let registry = Arc::new(CommandRegistry::from_commands(builtin_commands(&modes)));
        Self {
            outbox,
            renderer,
            modes,
            engine: AutocompleteEngine::new(Arc::clone(&registry)),
            registry,
            transcript: Transcript::new(),
            cursor: RenderCursor::new(),
            max_visible,
            next_local_id: 0,
        }
    }

    pub(crate) fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    // -----------------------------------------------------------------------
    // Extension → terminal
    // -----------------------------------------------------------------------

    pub(crate) fn handle_extension_message(&mut self, message: &ExtensionMessage) {
        self.transcript.apply_extension_message(message);
        if let Some(state) = self.transcript.state() {
            self.modes.publish(&state.custom_modes);
        }
        self.commit();
    }

    /// Render entries that became static since the last call.
    fn commit(&mut self) {
        let unified = self.transcript.unified();
        for entry in self.cursor.advance(&unified) {
            self.renderer.entry(entry);
        }
    }

    // -----------------------------------------------------------------------
    // Terminal → extension
    // -----------------------------------------------------------------------

    pub(crate) async fn handle_input(&mut self, line: &str) -> Flow {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Flow::Continue;
        }
        if line.trim_start().starts_with(COMMAND_PREFIX) {
            return self.handle_command(line.trim_start()).await;
        }
        self.submit_text(line.trim());
        Flow::Continue
    }

    async fn handle_command(&mut self, line: &str) -> Flow {
        let Some(parsed) = parse_command_input(line) else {
            self.show_suggestions(line).await;
            return Flow::Continue;
        };
        let registry = Arc::clone(&self.registry);
        let Some(command) = registry.find(&parsed.name) else {
            let suggestions = self.engine.get_all_suggestions(&format!("/{}", parsed.name)).await;
            if suggestions.is_empty() {
                self.renderer
                    .warn(&format!("Unknown command: /{}. Type /help for commands.", parsed.name));
            } else {
                self.renderer.status(&format!("No command /{}. Did you mean:", parsed.name));
                self.renderer.suggestions(&suggestions, self.max_visible);
            }
            return Flow::Continue;
        };

        let validation = validate_arguments(&command, &parsed.args);
        if !validation.valid {
            self.renderer
                .warn(validation.error.as_deref().unwrap_or("invalid arguments"));
            self.renderer.status(&format!("Usage: {}", command.usage));
            self.show_suggestions(&format!("/{} ", parsed.name)).await;
            return Flow::Continue;
        }

        match builtin_action(&parsed, &registry) {
            BuiltinAction::Help => {
                for command in registry.commands() {
                    self.renderer
                        .status(&format!("{:<16} {}", command.usage, command.description));
                }
            }
            BuiltinAction::Mode(Some(mode)) => {
                if self.post(WebviewMessage::mode(mode.clone())) {
                    self.renderer.status(&format!("Mode: {mode}"));
                }
            }
            BuiltinAction::Mode(None) => {
                let mode = self.transcript.mode().unwrap_or("code").to_string();
                self.renderer.status(&format!("Current mode: {mode}"));
            }
            BuiltinAction::NewTask(prompt) => {
                self.reset();
                if self.post(WebviewMessage::clear_task()) {
                    if let Some(prompt) = prompt {
                        self.submit_text(&prompt);
                    }
                }
            }
            BuiltinAction::Clear => {
                self.reset();
                self.post(WebviewMessage::clear_task());
            }
            BuiltinAction::Exit => return Flow::Exit,
            BuiltinAction::Unknown(name) => {
                self.renderer.warn(&format!("/{name} is not available here"));
            }
        }
        Flow::Continue
    }

    async fn show_suggestions(&self, input: &str) {
        let suggestions: SuggestionResult = self.engine.get_all_suggestions(input).await;
        self.renderer.suggestions(&suggestions, self.max_visible);
    }

    /// Plain text starts a task, or answers the extension once one exists.
    fn submit_text(&mut self, text: &str) {
        let message = if self.transcript.messages().is_empty() {
            WebviewMessage::new_task(text)
        } else {
            WebviewMessage::ask_response("messageResponse", Some(text))
        };
        self.add_local("user", text);
        if let Err(err) = (self.outbox)(message) {
            self.add_local("error", &format!("Error sending message: {err}"));
        }
    }

    /// Append a locally authored entry after everything already shown.
    fn add_local(&mut self, kind: &str, content: &str) {
        self.next_local_id += 1;
        let after_last = self
            .transcript
            .unified()
            .last()
            .map_or(0, |entry| entry.ts() + 1);
        self.transcript.add_local(FrontendMessage::new(
            format!("local-{}", self.next_local_id),
            kind,
            content,
            now_unix_millis().max(after_last),
        ));
        self.commit();
    }

    fn reset(&mut self) {
        self.transcript.clear();
        self.cursor.reset();
    }

    fn post(&self, message: WebviewMessage) -> bool {
        match (self.outbox)(message) {
            Ok(()) => true,
            Err(err) => {
                self.renderer.error(&err.to_string());
                false
            }
        }
    }
}
