//! Error taxonomy for the host runtime.
//!
//! Only [`StartupError`] is meant to reach the caller of a long-running
//! session. Everything else is contained where it happens and logged.

use std::path::PathBuf;

use thiserror::Error;

use crate::host::HostState;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// StartupError
// ---------------------------------------------------------------------------

/// Failures that abort [`crate::host::ExtensionHost::start`].
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("extension bundle not found at {}", .0.display())]
    BundleNotFound(PathBuf),
    #[error("invalid bundle manifest {}: {reason}", .path.display())]
    InvalidManifest { path: PathBuf, reason: String },
    #[error("bundle entry `{0}` could not be resolved")]
    EntryNotFound(String),
    #[error("bundle entry `{0}` does not export an activate function")]
    MissingActivate(String),
    #[error("bundle requires capability `{0}` which this host does not provide")]
    MissingCapability(String),
    #[error("extension activation failed: {0}")]
    ActivationFailed(String),
    #[error("another extension host is already live in this process")]
    HostAlreadyRunning,
    #[error("extension host was stopped during activation")]
    Stopped,
    #[error("extension host cannot start from state {0}")]
    InvalidState(HostState),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Host(#[from] HostError),
}

// ---------------------------------------------------------------------------
// HostError
// ---------------------------------------------------------------------------

/// Steady-state host failures.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("extension host is not active (state: {0})")]
    NotActive(HostState),
    #[error("command `{0}` is not registered")]
    UnknownCommand(String),
    #[error("module `{0}` not found")]
    ModuleNotFound(String),
    #[error("module `{specifier}` failed to load: {reason}")]
    ModuleLoad { specifier: String, reason: String },
    #[error("storage: {0}")]
    Storage(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// BridgeError
// ---------------------------------------------------------------------------

/// Errors raised while opening a message bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge `{0}` is already open")]
    AlreadyOpen(String),
}

// ---------------------------------------------------------------------------
// ExtensionError
// ---------------------------------------------------------------------------

/// Error reported by extension code: activation, message handlers,
/// disposables and host commands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExtensionError {
    message: String,
}

impl ExtensionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<HostError> for ExtensionError {
    fn from(e: HostError) -> Self {
        Self::new(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e = ConfigError::from(io_err);
        let s = e.to_string();
        assert!(s.starts_with("io:"), "got: {s}");
        assert!(s.contains("file not found"));
    }

    #[test]
    fn config_error_from_toml() {
        let toml_err: toml::de::Error = toml::from_str::<toml::Value>("x = [unclosed").unwrap_err();
        let e = ConfigError::from(toml_err);
        assert!(e.to_string().starts_with("toml:"));
    }

    #[test]
    fn startup_error_names_missing_bundle_path() {
        let e = StartupError::BundleNotFound(PathBuf::from("/opt/bundle"));
        assert_eq!(e.to_string(), "extension bundle not found at /opt/bundle");
    }

    #[test]
    fn not_active_reports_state() {
        let e = HostError::NotActive(HostState::Deactivated);
        assert_eq!(
            e.to_string(),
            "extension host is not active (state: deactivated)"
        );
    }

    #[test]
    fn extension_error_from_host_error_keeps_message() {
        let e = ExtensionError::from(HostError::UnknownCommand("kilo.open".into()));
        assert_eq!(e.message(), "command `kilo.open` is not registered");
    }

    #[test]
    fn startup_error_wraps_bridge_error_transparently() {
        let e = StartupError::from(BridgeError::AlreadyOpen("session".into()));
        assert_eq!(e.to_string(), "bridge `session` is already open");
    }
}
