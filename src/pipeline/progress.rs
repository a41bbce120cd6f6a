//! Externally visible job progress.
//!
//! Progress lives in a string-keyed store shared by every stage and by status
//! queries. Writes are single-key sets and increments; readers may observe
//! any intermediate state.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A value held in the progress store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ProgressValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ProgressValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ProgressValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ProgressValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for ProgressValue {
    fn from(b: bool) -> Self {
        ProgressValue::Bool(b)
    }
}

impl From<i64> for ProgressValue {
    fn from(i: i64) -> Self {
        ProgressValue::Int(i)
    }
}

impl From<u32> for ProgressValue {
    fn from(i: u32) -> Self {
        ProgressValue::Int(i as i64)
    }
}

impl From<String> for ProgressValue {
    fn from(s: String) -> Self {
        ProgressValue::Text(s)
    }
}

impl From<&str> for ProgressValue {
    fn from(s: &str) -> Self {
        ProgressValue::Text(s.to_string())
    }
}

/// Key-value store for job progress.
pub trait ProgressStore: Send + Sync {
    fn get(&self, key: &str) -> Option<ProgressValue>;

    fn set(&self, key: &str, value: ProgressValue);

    /// Add `delta` to an integer key (missing keys count as 0) and return the new value.
    fn increment(&self, key: &str, delta: i64) -> i64;

    fn delete(&self, key: &str);

    /// Return the value of `key`, storing `default` first if it is missing.
    fn get_or_set(&self, key: &str, default: ProgressValue) -> ProgressValue {
        match self.get(key) {
            Some(value) => value,
            None => {
                self.set(key, default.clone());
                default
            }
        }
    }
}

/// In-process progress store.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    values: Mutex<HashMap<String, ProgressValue>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn get(&self, key: &str) -> Option<ProgressValue> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: ProgressValue) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
    }

    fn increment(&self, key: &str, delta: i64) -> i64 {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        let current = values.get(key).and_then(ProgressValue::as_int).unwrap_or(0);
        values.insert(key.to_string(), ProgressValue::Int(current + delta));
        current + delta
    }

    fn delete(&self, key: &str) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
    }

    fn get_or_set(&self, key: &str, default: ProgressValue) -> ProgressValue {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.entry(key.to_string()).or_insert(default).clone()
    }
}

/// The five progress fields of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressKey {
    Processed,
    Total,
    FeaturesLoaded,
    Error,
    ErrorDescription,
}

impl ProgressKey {
    pub const ALL: [ProgressKey; 5] = [
        ProgressKey::Processed,
        ProgressKey::Total,
        ProgressKey::FeaturesLoaded,
        ProgressKey::Error,
        ProgressKey::ErrorDescription,
    ];

    fn suffix(self) -> &'static str {
        match self {
            ProgressKey::Processed => "processed",
            ProgressKey::Total => "total",
            ProgressKey::FeaturesLoaded => "features_loaded",
            ProgressKey::Error => "error",
            ProgressKey::ErrorDescription => "error_description",
        }
    }

    /// Store key for a job, `{id}-{field}`.
    pub fn key(self, id: &str) -> String {
        format!("{}-{}", id, self.suffix())
    }

    fn default_value(self) -> ProgressValue {
        match self {
            ProgressKey::Processed | ProgressKey::Total => ProgressValue::Int(0),
            ProgressKey::FeaturesLoaded | ProgressKey::Error => ProgressValue::Bool(false),
            ProgressKey::ErrorDescription => ProgressValue::Text(String::new()),
        }
    }
}

/// Snapshot returned by a status query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub processed: i64,
    pub total: i64,
    pub features_loaded: bool,
    pub error: bool,
    pub error_description: String,
}

impl JobProgress {
    /// Read the status of a job.
    ///
    /// Fails with `TaskNotFound` if the job never started; missing fields are
    /// filled with their defaults, which are written back to the store.
    pub fn fetch(store: &dyn ProgressStore, id: &str) -> Result<Self> {
        if store.get(&ProgressKey::Processed.key(id)).is_none() {
            return Err(Error::TaskNotFound(id.to_string()));
        }
        let field = |key: ProgressKey| store.get_or_set(&key.key(id), key.default_value());

        Ok(Self {
            processed: field(ProgressKey::Processed).as_int().unwrap_or(0),
            total: field(ProgressKey::Total).as_int().unwrap_or(0),
            features_loaded: field(ProgressKey::FeaturesLoaded).as_bool().unwrap_or(false),
            error: field(ProgressKey::Error).as_bool().unwrap_or(false),
            error_description: field(ProgressKey::ErrorDescription)
                .as_text()
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// Whether every page image has been consumed.
    pub fn is_finished(&self) -> bool {
        self.features_loaded && self.total > 0 && self.processed >= self.total
    }
}
