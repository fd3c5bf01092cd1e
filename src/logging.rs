//! Diagnostic logging for the host process.
//!
//! The terminal belongs to the transcript, so events go to a daily rolling
//! file under the configured log directory. `TERMHOST_LOG` takes precedence
//! over the configured filter.

use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "TERMHOST_LOG";
pub const LOG_FILE_PREFIX: &str = "termhost.log";

/// Keeps the background writer alive; dropping it flushes pending lines.
pub struct LoggingGuard {
    _guard: WorkerGuard,
    log_dir: PathBuf,
}

impl LoggingGuard {
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Filter used when `TERMHOST_LOG` is unset or unparsable.
pub fn build_filter(env_value: Option<&str>, configured: &str) -> EnvFilter {
    env_value
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_new(configured).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the global subscriber. Fails if the directory cannot be created;
/// a subscriber installed earlier (tests) is left in place.
pub fn init(log_dir: &Path, level: &str) -> io::Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let env_value = std::env::var(LOG_ENV).ok();
    let filter = build_filter(env_value.as_deref(), level);
    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .is_ok();
    if installed {
        tracing::info!(log_dir = %log_dir.display(), level, "logging initialized");
    }

    Ok(LoggingGuard {
        _guard: guard,
        log_dir: log_dir.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_value_wins_over_configured_level() {
        assert_eq!(build_filter(Some("bridge=trace"), "warn").to_string(), "bridge=trace");
        assert_eq!(build_filter(None, "debug").to_string(), "debug");
    }

    #[test]
    fn unparsable_values_fall_back() {
        assert_eq!(build_filter(Some("bridge=loud"), "warn").to_string(), "warn");
        assert_eq!(build_filter(None, "bridge=loud").to_string(), "info");
    }
}
