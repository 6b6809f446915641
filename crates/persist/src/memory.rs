use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::adapter::{PersistError, PersistenceAdapter, validate_key};

/// In-memory adapter.
///
/// Values are held in serialized form so every `get` exercises the same
/// round-trip a durable adapter would. Writes to keys marked with
/// [`MemoryAdapter::fail_writes_for`] are rejected, which lets callers exercise
/// the degraded-durability path.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    values: Mutex<BTreeMap<String, String>>,
    failing: Mutex<BTreeSet<String>>,
    writes: Mutex<u64>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent `set` for `key` until [`MemoryAdapter::heal`] is called.
    pub fn fail_writes_for(&self, key: &str) {
        lock(&self.failing).insert(key.to_string());
    }

    /// Stop rejecting writes for `key`.
    pub fn heal(&self, key: &str) {
        lock(&self.failing).remove(key);
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> u64 {
        *lock(&self.writes)
    }

    /// Keys currently holding a value.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.values).keys().cloned().collect()
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn get(&self, key: &str) -> Result<Option<Value>, PersistError> {
        validate_key(key)?;
        match lock(&self.values).get(key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), PersistError> {
        validate_key(key)?;
        if lock(&self.failing).contains(key) {
            return Err(PersistError::Rejected {
                key: key.to_string(),
                reason: "writes disabled for key".into(),
            });
        }
        let raw = serde_json::to_string(value)?;
        lock(&self.values).insert(key.to_string(), raw);
        *lock(&self.writes) += 1;
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
