//! Capability surface handed to an activating extension.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::bundle::Bundle;
use super::memento::Memento;
use crate::bridge::{BackendChannel, HandlerId};
use crate::console::Console;
use crate::error::{ExtensionError, HostError};
use crate::protocol::{ExtensionMessage, ExtensionState, WebviewMessage};

/// Directory under the workspace holding host-managed files.
pub const HOST_DIR: &str = ".termhost";
pub const GLOBAL_STATE_FILE: &str = "global-state.json";

pub type CommandHandler = Arc<dyn Fn(&[Value]) -> Result<Value, ExtensionError> + Send + Sync>;

/// Cleanup registered by the extension, run once at deactivation.
pub type Disposable = Box<dyn FnOnce() -> Result<(), ExtensionError> + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub extension: PathBuf,
    pub global_storage: PathBuf,
    pub workspace_storage: PathBuf,
    pub log_dir: PathBuf,
    pub bin_unpacked: Option<PathBuf>,
}

impl StoragePaths {
    /// Layout for a workspace. Global storage defaults to
    /// `~/.termhost/global-storage`, falling back to the workspace when no
    /// home directory is known.
    pub fn for_workspace(
        workspace: &Path,
        extension: &Path,
        global_root: Option<&Path>,
        bin_unpacked: Option<&Path>,
    ) -> Self {
        let host_dir = workspace.join(HOST_DIR);
        let global_storage = match global_root {
            Some(root) => root.to_path_buf(),
            None => dirs::home_dir()
                .map(|home| home.join(HOST_DIR))
                .unwrap_or_else(|| host_dir.clone())
                .join("global-storage"),
        };
        Self {
            extension: extension.to_path_buf(),
            global_storage,
            workspace_storage: host_dir.join("workspace-storage"),
            log_dir: host_dir.join("logs"),
            bin_unpacked: bin_unpacked.map(Path::to_path_buf),
        }
    }

    fn create_dirs(&self) -> Result<(), HostError> {
        for dir in [&self.global_storage, &self.workspace_storage, &self.log_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Inputs used to build a [`HostContext`].
pub(crate) struct ContextSeed<'a> {
    pub bundle: &'a Bundle,
    pub workspace: &'a Path,
    pub storage: StoragePaths,
    pub settings: Map<String, Value>,
    pub console: Console,
    pub backend: BackendChannel,
}

pub struct HostContext {
    extension_id: String,
    workspace: PathBuf,
    storage: StoragePaths,
    console: Console,
    backend: BackendChannel,
    commands: Mutex<HashMap<String, CommandHandler>>,
    settings: Mutex<Map<String, Value>>,
    global_state: Memento,
    state: Mutex<ExtensionState>,
    subscriptions: Mutex<Vec<Disposable>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HostContext {
    pub(crate) fn build(seed: ContextSeed<'_>) -> Result<Self, HostError> {
        seed.storage.create_dirs()?;
        let global_state = Memento::open(&seed.storage.global_storage.join(GLOBAL_STATE_FILE));
        let state = ExtensionState {
            mode: "code".to_string(),
            cwd: Some(seed.workspace.display().to_string()),
            version: seed.bundle.version.clone(),
            ..ExtensionState::default()
        };
        Ok(Self {
            extension_id: seed.bundle.name.clone(),
            workspace: seed.workspace.to_path_buf(),
            storage: seed.storage,
            console: seed.console,
            backend: seed.backend,
            commands: Mutex::new(HashMap::new()),
            settings: Mutex::new(seed.settings),
            global_state,
            state: Mutex::new(state),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn storage(&self) -> &StoragePaths {
        &self.storage
    }

    /// Console the extension should log through.
    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn global_state(&self) -> &Memento {
        &self.global_state
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Register a command; a later registration under the same id replaces
    /// the earlier one.
    pub fn register_command<F>(&self, id: &str, handler: F)
    where
        F: Fn(&[Value]) -> Result<Value, ExtensionError> + Send + Sync + 'static,
    {
        if lock(&self.commands)
            .insert(id.to_string(), Arc::new(handler))
            .is_some()
        {
            tracing::debug!(command = id, "command re-registered");
        }
    }

    pub fn has_command(&self, id: &str) -> bool {
        lock(&self.commands).contains_key(id)
    }

    pub fn execute_command(&self, id: &str, args: &[Value]) -> Result<Value, ExtensionError> {
        let handler = lock(&self.commands)
            .get(id)
            .cloned()
            .ok_or_else(|| HostError::UnknownCommand(id.to_string()))?;
        match catch_unwind(AssertUnwindSafe(|| handler(args))) {
            Ok(result) => result,
            Err(_) => Err(ExtensionError::new(format!("command `{id}` panicked"))),
        }
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    pub fn configuration(&self, section: &str) -> Configuration<'_> {
        Configuration {
            context: self,
            section: section.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Messaging and state
    // -----------------------------------------------------------------------

    /// Post a message toward the front end. No-op once the bridge is gone.
    pub fn post_message(&self, message: ExtensionMessage) {
        self.backend.send(message);
    }

    /// Listen for front end messages.
    pub fn on_message<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&WebviewMessage) -> Result<(), ExtensionError> + Send + Sync + 'static,
    {
        self.backend.on(handler)
    }

    pub fn state(&self) -> ExtensionState {
        lock(&self.state).clone()
    }

    pub fn update_state(&self, update: impl FnOnce(&mut ExtensionState)) {
        update(&mut lock(&self.state));
    }

    /// Post the current state snapshot.
    pub fn broadcast_state(&self) {
        let message = ExtensionMessage::state(&self.state());
        self.post_message(message);
    }

    // -----------------------------------------------------------------------
    // Disposables
    // -----------------------------------------------------------------------

    pub fn push_subscription(
        &self,
        disposable: impl FnOnce() -> Result<(), ExtensionError> + Send + 'static,
    ) {
        lock(&self.subscriptions).push(Box::new(disposable));
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    /// Run every disposable in reverse registration order and drop the
    /// registered commands. Failures are collected, never raised.
    pub(crate) fn dispose_all(&self) -> Vec<String> {
        let subscriptions: Vec<Disposable> = lock(&self.subscriptions).drain(..).collect();
        let mut errors = Vec::new();
        for disposable in subscriptions.into_iter().rev() {
            match catch_unwind(AssertUnwindSafe(disposable)) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errors.push(format!("disposable failed: {err}")),
                Err(_) => errors.push("disposable panicked".to_string()),
            }
        }
        lock(&self.commands).clear();
        errors
    }
}

/// Workspace-scoped settings for one section.
pub struct Configuration<'a> {
    context: &'a HostContext,
    section: String,
}

impl Configuration<'_> {
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let settings = lock(&self.context.settings);
        settings
            .get(&self.section)
            .and_then(|section| section.get(key))
            .or_else(|| settings.get(&format!("{}.{key}", self.section)))
            .cloned()
    }

    /// Typed read. Values of the wrong shape read as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_value(key)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn update(&self, key: &str, value: Value) {
        let mut settings = lock(&self.context.settings);
        let section = settings
            .entry(self.section.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !section.is_object() {
            *section = Value::Object(Map::new());
        }
        if let Value::Object(fields) = section {
            fields.insert(key.to_string(), value);
        }
    }
}
