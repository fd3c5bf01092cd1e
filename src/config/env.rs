//! Environment overrides.
//!
//! `TERMHOST_LOG` is read by the logging layer itself; everything else is
//! applied here on top of the file configuration.

use std::path::PathBuf;

use crate::error::ConfigError;

use super::Config;

pub const WORKSPACE_ENV: &str = "TERMHOST_WORKSPACE";
pub const EXTENSION_PATH_ENV: &str = "TERMHOST_EXTENSION_PATH";
pub const BIN_UNPACKED_PATH_ENV: &str = "TERMHOST_BIN_UNPACKED_PATH";
pub const BRIDGE_TRACE_ENV: &str = "TERMHOST_BRIDGE_TRACE";

pub(super) fn apply_env_overrides<FEnv>(
    config: &mut Config,
    env_lookup: &FEnv,
) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(path) = env_path(env_lookup, WORKSPACE_ENV) {
        config.host.workspace = Some(path);
    }
    if let Some(path) = env_path(env_lookup, EXTENSION_PATH_ENV) {
        config.host.extension_path = Some(path);
    }
    if let Some(path) = env_path(env_lookup, BIN_UNPACKED_PATH_ENV) {
        config.host.bin_unpacked_path = Some(path);
    }
    if let Some(raw) = env_lookup(BRIDGE_TRACE_ENV) {
        config.bridge.log_traffic = parse_flag(&raw).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "invalid {BRIDGE_TRACE_ENV} value `{raw}`: expected true/false, 1/0, yes/no or on/off"
            ))
        })?;
    }
    Ok(())
}

/// Blank values count as unset.
fn env_path<FEnv>(env_lookup: &FEnv, name: &str) -> Option<PathBuf>
where
    FEnv: Fn(&str) -> Option<String>,
{
    env_lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
