//! In-memory structured log store fed by the console interceptor.
//!
//! Entries are kept newest-first in a bounded buffer so a logs view can show
//! recent extension output, and every entry is mirrored to `tracing` under
//! the `extension` target.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::console::LogSink;

/// Default number of entries retained.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Debug,
    Error,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: String,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Query over stored entries. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub levels: Vec<LogLevel>,
    /// Substring match on the entry source.
    pub source: Option<String>,
    /// Only entries at or after this unix-millis timestamp.
    pub since: Option<u64>,
}

impl LogFilter {
    fn matches(&self, entry: &LogEntry) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&entry.level) {
            return false;
        }
        if let Some(source) = self.source.as_deref() {
            if !entry
                .source
                .as_deref()
                .is_some_and(|entry_source| entry_source.contains(source))
            {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogCounts {
    pub info: usize,
    pub debug: usize,
    pub error: usize,
    pub warn: usize,
}

type Listener = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Handle returned by [`LogService::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

struct Buffer {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
}

pub struct LogService {
    buffer: Mutex<Buffer>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl Default for LogService {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl LogService {
    pub fn new(max_entries: usize) -> Self {
        Self {
            buffer: Mutex::new(Buffer {
                entries: VecDeque::new(),
                max_entries: max_entries.max(1),
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn info(&self, message: impl Into<String>, source: &str) {
        self.add(LogLevel::Info, message.into(), Some(source), None);
    }

    pub fn debug(&self, message: impl Into<String>, source: &str) {
        self.add(LogLevel::Debug, message.into(), Some(source), None);
    }

    pub fn warn(&self, message: impl Into<String>, source: &str) {
        self.add(LogLevel::Warn, message.into(), Some(source), None);
    }

    pub fn error(&self, message: impl Into<String>, source: &str) {
        self.add(LogLevel::Error, message.into(), Some(source), None);
    }

    /// Record one entry with optional structured context.
    pub fn add(
        &self,
        level: LogLevel,
        message: String,
        source: Option<&str>,
        context: Option<Value>,
    ) {
        let entry = LogEntry {
            id: new_entry_id(),
            timestamp: now_unix_millis(),
            level,
            message,
            source: source.map(str::to_string),
            context,
        };
        mirror_to_tracing(&entry);

        {
            let mut buffer = lock(&self.buffer);
            buffer.entries.push_front(entry.clone());
            let max = buffer.max_entries;
            buffer.entries.truncate(max);
        }

        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&entry))).is_err() {
                tracing::warn!("log listener panicked");
            }
        }
    }

    /// Stored entries, newest first.
    pub fn get_logs(&self, filter: &LogFilter) -> Vec<LogEntry> {
        lock(&self.buffer)
            .entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> LogCounts {
        let buffer = lock(&self.buffer);
        let mut counts = LogCounts::default();
        for entry in &buffer.entries {
            match entry.level {
                LogLevel::Info => counts.info += 1,
                LogLevel::Debug => counts.debug += 1,
                LogLevel::Error => counts.error += 1,
                LogLevel::Warn => counts.warn += 1,
            }
        }
        counts
    }

    pub fn subscribe(&self, listener: impl Fn(&LogEntry) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        lock(&self.listeners).retain(|(existing, _)| *existing != id);
    }

    pub fn clear(&self) {
        lock(&self.buffer).entries.clear();
    }

    pub fn set_max_entries(&self, max: usize) {
        let mut buffer = lock(&self.buffer);
        buffer.max_entries = max.max(1);
        let max = buffer.max_entries;
        buffer.entries.truncate(max);
    }

    pub fn max_entries(&self) -> usize {
        lock(&self.buffer).max_entries
    }

    pub fn len(&self) -> usize {
        lock(&self.buffer).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for LogService {
    fn record(&self, level: LogLevel, message: String, source: &str) {
        self.add(level, message, Some(source), None);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn mirror_to_tracing(entry: &LogEntry) {
    let source = entry.source.as_deref().unwrap_or("");
    match entry.level {
        LogLevel::Info => tracing::info!(target: "extension", source, "{}", entry.message),
        LogLevel::Debug => tracing::debug!(target: "extension", source, "{}", entry.message),
        LogLevel::Warn => tracing::warn!(target: "extension", source, "{}", entry.message),
        LogLevel::Error => tracing::error!(target: "extension", source, "{}", entry.message),
    }
}

fn new_entry_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect();
    format!("{}-{suffix}", now_unix_millis())
}

pub(crate) fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|delta| delta.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_stored_newest_first() {
        let logs = LogService::default();
        logs.info("first", "host");
        logs.error("second", "host");
        let entries = logs.get_logs(&LogFilter::default());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[1].message, "first");
    }

    #[test]
    fn buffer_is_bounded() {
        let logs = LogService::new(3);
        for idx in 0..5 {
            logs.info(format!("line {idx}"), "host");
        }
        let entries = logs.get_logs(&LogFilter::default());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "line 4");
        assert_eq!(entries[2].message, "line 2");

        logs.set_max_entries(1);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs.max_entries(), 1);
    }

    #[test]
    fn filter_by_level_source_and_since() {
        let logs = LogService::default();
        logs.info("a", "extension");
        logs.warn("b", "bridge");
        logs.error("c", "extension");

        let errors = logs.get_logs(&LogFilter {
            levels: vec![LogLevel::Error, LogLevel::Warn],
            ..LogFilter::default()
        });
        assert_eq!(errors.len(), 2);

        let from_extension = logs.get_logs(&LogFilter {
            source: Some("ext".to_string()),
            ..LogFilter::default()
        });
        assert_eq!(from_extension.len(), 2);

        let future = logs.get_logs(&LogFilter {
            since: Some(u64::MAX),
            ..LogFilter::default()
        });
        assert!(future.is_empty());
    }

    #[test]
    fn counts_by_level() {
        let logs = LogService::default();
        logs.info("a", "x");
        logs.info("b", "x");
        logs.debug("c", "x");
        logs.warn("d", "x");
        assert_eq!(
            logs.counts(),
            LogCounts {
                info: 2,
                debug: 1,
                error: 0,
                warn: 1
            }
        );
        logs.clear();
        assert!(logs.is_empty());
    }

    #[test]
    fn subscribers_see_new_entries_until_unsubscribed() {
        let logs = LogService::default();
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);
        let id = logs.subscribe(move |entry| {
            sink.lock().expect("lock").push(entry.message.clone());
        });
        logs.info("one", "x");
        logs.unsubscribe(id);
        logs.info("two", "x");
        assert_eq!(*seen.lock().expect("lock"), vec!["one".to_string()]);
    }

    #[test]
    fn log_sink_records_with_source() {
        let logs = LogService::default();
        logs.record(LogLevel::Warn, "from console".to_string(), "extension");
        let entry = &logs.get_logs(&LogFilter::default())[0];
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.source.as_deref(), Some("extension"));
        assert!(entry.id.contains('-'));
    }
}
