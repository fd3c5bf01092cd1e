//! Diagnostic record of messages crossing the bridge.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::logs::now_unix_millis;

/// Default number of traffic records kept in memory.
pub const DEFAULT_TRAFFIC_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Front end toward the extension.
    ToBackend,
    /// Extension toward the front end.
    ToFrontend,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToBackend => "to_backend",
            Self::ToFrontend => "to_frontend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficRecord {
    pub seq: u64,
    pub ts_unix_ms: u64,
    pub direction: Direction,
    pub kind: String,
}

pub struct TrafficLog {
    records: Mutex<VecDeque<TrafficRecord>>,
    capacity: usize,
    seq: AtomicU64,
}

impl TrafficLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            seq: AtomicU64::new(0),
        }
    }

    pub fn record(&self, direction: Direction, kind: &str) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let record = TrafficRecord {
            seq,
            ts_unix_ms: now_unix_millis(),
            direction,
            kind: kind.to_string(),
        };
        tracing::trace!(
            target: "bridge",
            seq,
            direction = direction.as_str(),
            kind,
            "bridge message"
        );
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<TrafficRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase_and_capacity_is_enforced() {
        let log = TrafficLog::new(2);
        log.record(Direction::ToBackend, "newTask");
        log.record(Direction::ToFrontend, "state");
        log.record(Direction::ToFrontend, "messageUpdated");
        let records = log.snapshot();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 2);
        assert_eq!(records[1].seq, 3);
        assert_eq!(records[1].kind, "messageUpdated");
        assert_eq!(records[1].direction, Direction::ToFrontend);
    }
}
