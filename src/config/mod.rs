//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`TERMHOST_WORKSPACE`, `TERMHOST_EXTENSION_PATH`,
//!    `TERMHOST_BIN_UNPACKED_PATH`, `TERMHOST_BRIDGE_TRACE`)
//! 2. TOML file specified via `--config`
//! 3. `./termhost.toml` in the current directory
//! 4. `$XDG_CONFIG_HOME/termhost/termhost.toml` (or `~/.config/termhost/termhost.toml`)
//! 5. Built-in defaults
//!
//! Command-line flags are applied by the binary on top of the result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::BridgeOptions;
use crate::demo::EchoOptions;
use crate::error::ConfigError;
use crate::host::{HostOptions, HOST_DIR};

mod defaults;
mod env;
mod sources;
mod types;

pub use defaults::CONFIG_FILE_NAME;
pub use env::{BIN_UNPACKED_PATH_ENV, BRIDGE_TRACE_ENV, EXTENSION_PATH_ENV, WORKSPACE_ENV};
pub use sources::config_root_dir;
pub use types::{
    AutocompleteConfig, BridgeConfig, Config, ConfigSource, DemoConfig, ExtensionConfig,
    HostConfig, LoadedConfig, LoggingConfig,
};

use env::apply_env_overrides;
use sources::read_config_text_with_sources;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration from disk and environment.
pub fn load_config(path_override: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        config_root_dir,
    )
}

fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&Path>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<LoadedConfig, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let (text, source) = read_config_text_with_sources(path_override, &read_file, &config_root)?;
    let mut config: Config = toml::from_str(&text)?;
    apply_env_overrides(&mut config, &env_lookup)?;
    config.validate()?;
    tracing::debug!(source = %source, "configuration loaded");
    Ok(LoadedConfig { config, source })
}

/// Commented default configuration file.
pub fn default_config_template() -> &'static str {
    defaults::DEFAULT_CONFIG_TEMPLATE
}

// ---------------------------------------------------------------------------
// Validation and conversion
// ---------------------------------------------------------------------------

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.host.session_name.trim();
        if name.is_empty() {
            return Err(ConfigError::Invalid(
                "host.session_name must not be empty".to_string(),
            ));
        }
        if self.logging.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "logging.max_entries must be at least 1".to_string(),
            ));
        }
        if self.bridge.traffic_capacity == 0 {
            return Err(ConfigError::Invalid(
                "bridge.traffic_capacity must be at least 1".to_string(),
            ));
        }
        if self.autocomplete.max_visible == 0 {
            return Err(ConfigError::Invalid(
                "autocomplete.max_visible must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory for the diagnostic log file.
    pub fn log_dir(&self, cwd: &Path) -> PathBuf {
        match &self.logging.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => self.host.workspace_dir(cwd).join(HOST_DIR).join("logs"),
        }
    }

    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            log_traffic: self.bridge.log_traffic,
            traffic_capacity: self.bridge.traffic_capacity,
        }
    }

    pub fn echo_options(&self) -> EchoOptions {
        EchoOptions {
            chunk_chars: self.demo.chunk_chars.max(1),
            chunk_delay: Duration::from_millis(self.demo.chunk_delay_ms),
        }
    }

    /// Host options for hosting the bundle at `extension_path`.
    pub fn host_options(&self, cwd: &Path, extension_path: PathBuf) -> HostOptions {
        let resolve = |path: &PathBuf| {
            if path.is_absolute() {
                path.clone()
            } else {
                cwd.join(path)
            }
        };
        let mut options = HostOptions::new(self.host.workspace_dir(cwd), resolve(&extension_path));
        options.bin_unpacked_path = self.host.bin_unpacked_path.as_ref().map(resolve);
        options.global_storage_path = self.host.global_storage_path.as_ref().map(resolve);
        options.intercept_modules = self.host.intercept_modules;
        options.session_name = self.host.session_name.trim().to_string();
        options.bridge = self.bridge_options();
        options.settings = self.extension.settings.clone();
        options
    }
}
