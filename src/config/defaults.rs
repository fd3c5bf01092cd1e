//! Default configuration constants.

/// Commented template printed by `termhost --print-config`.
pub(super) const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../templates/termhost.toml");
/// File name looked up locally and under the global config root.
pub const CONFIG_FILE_NAME: &str = "termhost.toml";
/// Directory under the global config root.
pub(super) const CONFIG_DIR_NAME: &str = "termhost";

pub(super) const DEFAULT_SESSION_NAME: &str = "default";
pub(super) const DEFAULT_LOG_LEVEL: &str = "info";
pub(super) const DEFAULT_MAX_LOG_ENTRIES: usize = 1000;
pub(super) const DEFAULT_TRAFFIC_CAPACITY: usize = crate::bridge::DEFAULT_TRAFFIC_CAPACITY;
/// Suggestions shown below the input line.
pub(super) const DEFAULT_MAX_VISIBLE: usize = 8;
pub(super) const DEFAULT_CHUNK_CHARS: usize = 8;
pub(super) const DEFAULT_CHUNK_DELAY_MS: u64 = 30;
