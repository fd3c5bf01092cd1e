//! Configuration data model.
//!
//! Every section deserializes with defaults so a partial file (or none)
//! yields a complete [`Config`].

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

use super::defaults::{
    DEFAULT_CHUNK_CHARS, DEFAULT_CHUNK_DELAY_MS, DEFAULT_LOG_LEVEL, DEFAULT_MAX_LOG_ENTRIES,
    DEFAULT_MAX_VISIBLE, DEFAULT_SESSION_NAME, DEFAULT_TRAFFIC_CAPACITY,
};

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub host: HostConfig,
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
    pub autocomplete: AutocompleteConfig,
    pub demo: DemoConfig,
    pub extension: ExtensionConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Defaults to the current directory.
    pub workspace: Option<PathBuf>,
    /// Without one the built-in echo bundle is hosted.
    pub extension_path: Option<PathBuf>,
    pub bin_unpacked_path: Option<PathBuf>,
    pub global_storage_path: Option<PathBuf>,
    pub intercept_modules: bool,
    pub session_name: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            extension_path: None,
            bin_unpacked_path: None,
            global_storage_path: None,
            intercept_modules: true,
            session_name: DEFAULT_SESSION_NAME.to_string(),
        }
    }
}

impl HostConfig {
    /// Workspace directory, with relative paths taken from `cwd`.
    pub fn workspace_dir(&self, cwd: &Path) -> PathBuf {
        match &self.workspace {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => cwd.join(path),
            None => cwd.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Keep a bounded record of relayed message types.
    pub log_traffic: bool,
    pub traffic_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_traffic: false,
            traffic_capacity: DEFAULT_TRAFFIC_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive for the diagnostic log file.
    pub level: String,
    /// Capacity of the in-memory extension log.
    pub max_entries: usize,
    /// Defaults to `<workspace>/.termhost/logs`.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            max_entries: DEFAULT_MAX_LOG_ENTRIES,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutocompleteConfig {
    pub max_visible: usize,
}

impl Default for AutocompleteConfig {
    fn default() -> Self {
        Self {
            max_visible: DEFAULT_MAX_VISIBLE,
        }
    }
}

/// Pacing of the built-in echo bundle.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    pub chunk_chars: usize,
    pub chunk_delay_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            chunk_chars: DEFAULT_CHUNK_CHARS,
            chunk_delay_ms: DEFAULT_CHUNK_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtensionConfig {
    /// Settings exposed through the extension's configuration capability.
    pub settings: Map<String, Value>,
}

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` path.
    Explicit(PathBuf),
    /// `./termhost.toml`.
    Local,
    /// `$XDG_CONFIG_HOME/termhost/termhost.toml`.
    Global(PathBuf),
    BuiltInDefaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(path) | Self::Global(path) => write!(f, "{}", path.display()),
            Self::Local => f.write_str("./termhost.toml"),
            Self::BuiltInDefaults => f.write_str("built-in defaults"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: ConfigSource,
}
