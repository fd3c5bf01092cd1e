//! Key/value state persisted as one JSON file.

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::HostError;

pub struct Memento {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl Memento {
    /// Load from `path`. A missing file starts empty; an unreadable one is
    /// logged and replaced on the next write.
    pub fn open(path: &Path) -> Self {
        let values = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(values) => values,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "discarding malformed state file");
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };
        Self {
            path: path.to_path_buf(),
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Set or, with `None`, remove a key and persist the whole map.
    pub fn update(&self, key: &str, value: Option<Value>) -> Result<(), HostError> {
        let snapshot = {
            let mut values = self.lock();
            match value {
                Some(value) => {
                    values.insert(key.to_string(), value);
                }
                None => {
                    values.remove(key);
                }
            }
            values.clone()
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&snapshot)?)?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestTempDir;
    use serde_json::json;

    #[test]
    fn values_persist_across_reopen() {
        let tmp = TestTempDir::new("memento");
        let path = tmp.child("nested/global-state.json");
        let memento = Memento::open(&path);
        assert!(memento.get("taskHistory").is_none());
        memento
            .update("taskHistory", Some(json!(["t1"])))
            .expect("write");
        memento.update("lastMode", Some(json!("ask"))).expect("write");
        memento.update("lastMode", None).expect("write");

        let reopened = Memento::open(&path);
        assert_eq!(reopened.get("taskHistory"), Some(json!(["t1"])));
        assert_eq!(reopened.keys(), vec!["taskHistory".to_string()]);
    }

    #[test]
    fn malformed_file_starts_empty() {
        let tmp = TestTempDir::new("memento-bad");
        let path = tmp.write_text("global-state.json", "[1,");
        assert!(Memento::open(&path).keys().is_empty());
    }
}
