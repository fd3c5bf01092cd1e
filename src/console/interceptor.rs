//! Redirection of the ambient console into a structured log sink.
//!
//! Reentrancy rule: the first [`install`] captures the originals and later
//! installs keep them, so a single [`restore`] always returns the surface to
//! its pre-install functions. Nested install/restore pairs from unrelated
//! owners are not supported; the extension host is the only caller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{format_args, replace_surface, surface, Console, ConsoleArg, ConsoleFn, Severity};
use crate::logs::LogLevel;

/// Source tag attached to every intercepted line.
pub const EXTENSION_SOURCE: &str = "extension";

/// Destination for intercepted console output.
pub trait LogSink: Send + Sync {
    fn record(&self, level: LogLevel, message: String, source: &str);
}

struct InterceptorState {
    originals: Option<Console>,
    intercepted: Option<Console>,
}

static STATE: Mutex<InterceptorState> = Mutex::new(InterceptorState {
    originals: None,
    intercepted: None,
});

fn state() -> MutexGuard<'static, InterceptorState> {
    STATE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn level_for(severity: Severity) -> LogLevel {
    match severity {
        Severity::Log | Severity::Info => LogLevel::Info,
        Severity::Error => LogLevel::Error,
        Severity::Warn => LogLevel::Warn,
        Severity::Debug => LogLevel::Debug,
    }
}

fn wrapper(sink: Arc<dyn LogSink>, severity: Severity) -> ConsoleFn {
    let level = level_for(severity);
    Arc::new(move |args: &[ConsoleArg]| {
        let message = catch_unwind(AssertUnwindSafe(|| format_args(args)))
            .unwrap_or_else(|_| "[Unserializable]".to_string());
        if catch_unwind(AssertUnwindSafe(|| {
            sink.record(level, message, EXTENSION_SOURCE)
        }))
        .is_err()
        {
            tracing::warn!(severity = severity.as_str(), "log sink panicked");
        }
    })
}

/// Replace the ambient console with wrappers forwarding to `sink`.
pub fn install(sink: Arc<dyn LogSink>) {
    let mut state = state();
    if state.originals.is_none() {
        state.originals = Some(surface());
    }
    let console = Console::from_fn(|severity| wrapper(Arc::clone(&sink), severity));
    replace_surface(console.clone());
    state.intercepted = Some(console);
    tracing::debug!("console interception installed");
}

/// Put the captured originals back. No-op when not installed.
pub fn restore() {
    let mut state = state();
    if let Some(originals) = state.originals.take() {
        replace_surface(originals);
        tracing::debug!("console interception restored");
    }
    state.intercepted = None;
}

/// The intercepted console while installed.
pub fn intercepted() -> Option<Console> {
    state().intercepted.clone()
}

pub fn is_installed() -> bool {
    state().originals.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{emit, Console};
    use crate::testsupport::{serial_guard, RecordingSink};
    use serde_json::json;

    #[test]
    fn install_then_restore_is_reference_identical() {
        let _guard = serial_guard();
        let before = surface();
        install(Arc::new(RecordingSink::default()));
        assert!(!surface().ptr_eq(&before));
        restore();
        assert!(surface().ptr_eq(&before));
    }

    #[test]
    fn double_install_keeps_first_originals() {
        let _guard = serial_guard();
        let before = surface();
        install(Arc::new(RecordingSink::default()));
        install(Arc::new(RecordingSink::default()));
        restore();
        assert!(surface().ptr_eq(&before));
    }

    #[test]
    fn restore_without_install_is_a_no_op() {
        let _guard = serial_guard();
        let before = surface();
        restore();
        restore();
        assert!(surface().ptr_eq(&before));
        assert!(intercepted().is_none());
    }

    #[test]
    fn intercepted_calls_reach_sink_with_normalized_levels() {
        let _guard = serial_guard();
        let sink = Arc::new(RecordingSink::default());
        install(sink.clone());
        emit(Severity::Log, crate::console_args!["hello", 1_i64]);
        emit(Severity::Info, crate::console_args!["info"]);
        emit(Severity::Error, crate::console_args![json!({"code": 7})]);
        emit(Severity::Warn, crate::console_args!["careful"]);
        emit(Severity::Debug, crate::console_args!["trace"]);
        restore();

        let records = sink.records();
        assert_eq!(
            records,
            vec![
                (LogLevel::Info, "hello 1".to_string(), EXTENSION_SOURCE.to_string()),
                (LogLevel::Info, "info".to_string(), EXTENSION_SOURCE.to_string()),
                (LogLevel::Error, r#"{"code":7}"#.to_string(), EXTENSION_SOURCE.to_string()),
                (LogLevel::Warn, "careful".to_string(), EXTENSION_SOURCE.to_string()),
                (LogLevel::Debug, "trace".to_string(), EXTENSION_SOURCE.to_string()),
            ]
        );
    }

    #[test]
    fn marker_is_set_while_installed_and_cleared_on_restore() {
        let _guard = serial_guard();
        install(Arc::new(RecordingSink::default()));
        let marker = intercepted().expect("marker set");
        assert!(marker.ptr_eq(&surface()));
        assert!(is_installed());
        restore();
        assert!(intercepted().is_none());
        assert!(!is_installed());
    }

    #[test]
    fn panicking_sink_does_not_escape_the_wrapper() {
        struct Exploding;
        impl LogSink for Exploding {
            fn record(&self, _level: LogLevel, _message: String, _source: &str) {
                panic!("sink failure");
            }
        }

        let _guard = serial_guard();
        install(Arc::new(Exploding));
        emit(Severity::Error, crate::console_args!["still fine"]);
        restore();
    }

    #[test]
    fn native_console_survives_a_full_cycle() {
        let _guard = serial_guard();
        restore();
        assert!(surface().ptr_eq(&Console::native()));
        install(Arc::new(RecordingSink::default()));
        restore();
        assert!(surface().ptr_eq(&Console::native()));
    }
}
