//! Process-wide logging surface used by loaded extension code.
//!
//! Extension modules log through a [`Console`] with five severities. The
//! ambient surface is a single process-wide [`Console`] that
//! [`install`] redirects into a [`LogSink`] and [`restore`] puts back.
//! Modules loaded through the intercepting module hook receive the
//! intercepted console directly (see [`intercepted`]).

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, OnceLock, RwLock};

mod interceptor;

pub use interceptor::{install, intercepted, is_installed, restore, LogSink, EXTENSION_SOURCE};

/// One logging function on the surface.
pub type ConsoleFn = Arc<dyn Fn(&[ConsoleArg]) + Send + Sync>;

/// The five logging severities of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Log,
    Error,
    Warn,
    Debug,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Log,
        Severity::Error,
        Severity::Warn,
        Severity::Debug,
        Severity::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Debug => "debug",
            Self::Info => "info",
        }
    }
}

/// One argument passed to a console call.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleArg {
    Text(String),
    Json(Value),
    /// The caller handed over a value that could not be converted.
    Unserializable(String),
}

impl ConsoleArg {
    /// Convert any serializable value, degrading to a placeholder on failure.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(Value::String(text)) => Self::Text(text),
            Ok(other) => Self::Json(other),
            Err(err) => Self::Unserializable(err.to_string()),
        }
    }

    /// Render as log text: strings verbatim, primitives as text, objects and
    /// arrays as compact JSON.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(Value::String(text)) => text.clone(),
            Self::Json(other) => other.to_string(),
            Self::Unserializable(reason) => format!("[Unserializable: {reason}]"),
        }
    }
}

impl From<&str> for ConsoleArg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ConsoleArg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Value> for ConsoleArg {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<i64> for ConsoleArg {
    fn from(value: i64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<u64> for ConsoleArg {
    fn from(value: u64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<f64> for ConsoleArg {
    fn from(value: f64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<bool> for ConsoleArg {
    fn from(value: bool) -> Self {
        Self::Json(Value::Bool(value))
    }
}

/// Build a console argument slice: `console.log(console_args!["x", 1])`.
#[macro_export]
macro_rules! console_args {
    ($($arg:expr),* $(,)?) => {
        &[$($crate::console::ConsoleArg::from($arg)),*]
    };
}

/// Join rendered arguments with single spaces.
pub fn format_args(args: &[ConsoleArg]) -> String {
    args.iter()
        .map(ConsoleArg::render)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A set of the five logging functions.
#[derive(Clone)]
pub struct Console {
    log: ConsoleFn,
    error: ConsoleFn,
    warn: ConsoleFn,
    debug: ConsoleFn,
    info: ConsoleFn,
}

impl Console {
    /// Build a console whose five slots come from `make`.
    pub fn from_fn(mut make: impl FnMut(Severity) -> ConsoleFn) -> Self {
        Self {
            log: make(Severity::Log),
            error: make(Severity::Error),
            warn: make(Severity::Warn),
            debug: make(Severity::Debug),
            info: make(Severity::Info),
        }
    }

    /// The process's original console writing to stdout/stderr.
    ///
    /// Built once; every call returns clones of the same functions.
    pub fn native() -> Self {
        static NATIVE: OnceLock<Console> = OnceLock::new();
        NATIVE
            .get_or_init(|| {
                Console::from_fn(|severity| {
                    Arc::new(move |args: &[ConsoleArg]| {
                        let line = format_args(args);
                        match severity {
                            Severity::Error | Severity::Warn => {
                                let _ = writeln!(std::io::stderr(), "{line}");
                            }
                            _ => {
                                let _ = writeln!(std::io::stdout(), "{line}");
                            }
                        }
                    }) as ConsoleFn
                })
            })
            .clone()
    }

    /// A console that looks up the ambient surface on every call.
    pub fn ambient() -> Self {
        Console::from_fn(|severity| {
            Arc::new(move |args: &[ConsoleArg]| emit(severity, args)) as ConsoleFn
        })
    }

    pub fn get(&self, severity: Severity) -> &ConsoleFn {
        match severity {
            Severity::Log => &self.log,
            Severity::Error => &self.error,
            Severity::Warn => &self.warn,
            Severity::Debug => &self.debug,
            Severity::Info => &self.info,
        }
    }

    pub fn call(&self, severity: Severity, args: &[ConsoleArg]) {
        (self.get(severity))(args)
    }

    pub fn log(&self, args: &[ConsoleArg]) {
        (self.log)(args)
    }

    pub fn error(&self, args: &[ConsoleArg]) {
        (self.error)(args)
    }

    pub fn warn(&self, args: &[ConsoleArg]) {
        (self.warn)(args)
    }

    pub fn debug(&self, args: &[ConsoleArg]) {
        (self.debug)(args)
    }

    pub fn info(&self, args: &[ConsoleArg]) {
        (self.info)(args)
    }

    /// True when all five slots point at the same functions.
    pub fn ptr_eq(&self, other: &Console) -> bool {
        Severity::ALL
            .iter()
            .all(|severity| Arc::ptr_eq(self.get(*severity), other.get(*severity)))
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

fn surface_cell() -> &'static RwLock<Console> {
    static SURFACE: OnceLock<RwLock<Console>> = OnceLock::new();
    SURFACE.get_or_init(|| RwLock::new(Console::native()))
}

/// Snapshot of the ambient surface.
pub fn surface() -> Console {
    surface_cell()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn replace_surface(console: Console) {
    let mut guard = surface_cell()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = console;
}

/// Call one severity on the ambient surface.
pub fn emit(severity: Severity, args: &[ConsoleArg]) {
    // Clone the slot first so a logging function may itself touch the surface.
    let slot = surface().get(severity).clone();
    slot(args);
}
