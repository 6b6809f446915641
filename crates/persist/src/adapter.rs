use serde_json::Value;
use std::sync::Arc;

/// Errors from persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid persistence key: {0:?}")]
    InvalidKey(String),
    #[error("integrity check failed for {key}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        key: String,
        expected: String,
        actual: String,
    },
    #[error("format version mismatch: store has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("write rejected for {key}: {reason}")]
    Rejected { key: String, reason: String },
}

/// Durable storage of individual named values.
///
/// The key space is the set of persisted field names. Implementations must be
/// usable from any thread; the state store calls `set` while serializing writes.
pub trait PersistenceAdapter: Send + Sync {
    /// Read a value. `Ok(None)` means the key was never written.
    fn get(&self, key: &str) -> Result<Option<Value>, PersistError>;

    /// Durably write a value, replacing any previous one.
    fn set(&self, key: &str, value: &Value) -> Result<(), PersistError>;
}

impl<T: PersistenceAdapter + ?Sized> PersistenceAdapter for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Value>, PersistError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), PersistError> {
        (**self).set(key, value)
    }
}

impl<T: PersistenceAdapter + ?Sized> PersistenceAdapter for Box<T> {
    fn get(&self, key: &str) -> Result<Option<Value>, PersistError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), PersistError> {
        (**self).set(key, value)
    }
}

/// Keys must be non-empty and limited to `[A-Za-z0-9_-]`.
pub fn validate_key(key: &str) -> Result<(), PersistError> {
    if hoard_common::is_storable_name(key) {
        Ok(())
    } else {
        Err(PersistError::InvalidKey(key.to_string()))
    }
}
