//! File-backed persistence.
//!
//! Layout inside the store directory:
//! ```text
//! store.meta.json   - on-disk format version
//! <key>.json        - one envelope per persisted field: { "sha256": ..., "value": ... }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::adapter::{PersistError, PersistenceAdapter, validate_key};

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

const META_FILE: &str = "store.meta.json";

/// Metadata stored in store.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub format_version: u32,
}

/// A persisted value together with the hash of its canonical encoding.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    sha256: String,
    value: Value,
}

/// Directory-backed adapter with per-key integrity checking.
#[derive(Debug)]
pub struct FileAdapter {
    root: PathBuf,
    meta: StoreMeta,
}

impl FileAdapter {
    /// Open or create a store at the given directory.
    ///
    /// Refuses to open a directory written with a different format version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let meta_path = root.join(META_FILE);
        let meta = if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.format_version != FORMAT_VERSION {
                return Err(PersistError::SchemaMismatch {
                    file_version: meta.format_version,
                    expected_version: FORMAT_VERSION,
                });
            }
            meta
        } else {
            let meta = StoreMeta {
                format_version: FORMAT_VERSION,
            };
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            meta
        };

        tracing::debug!(root = %root.display(), "opened file store");
        Ok(Self { root, meta })
    }

    /// Get the path to the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the metadata.
    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    /// Keys that currently have a value on disk, in name order.
    pub fn keys(&self) -> Result<Vec<String>, PersistError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.file_name().and_then(|n| n.to_str()) == Some(META_FILE) {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_key(stem).is_ok() {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, PersistError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl PersistenceAdapter for FileAdapter {
    fn get(&self, key: &str) -> Result<Option<Value>, PersistError> {
        let path = self.key_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let envelope: Envelope = serde_json::from_reader(std::fs::File::open(&path)?)?;
        let actual = sha256_hex(&serde_json::to_vec(&envelope.value)?);
        if actual != envelope.sha256 {
            return Err(PersistError::IntegrityMismatch {
                key: key.to_string(),
                expected: envelope.sha256,
                actual,
            });
        }
        Ok(Some(envelope.value))
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), PersistError> {
        let path = self.key_path(key)?;
        let envelope = Envelope {
            sha256: sha256_hex(&serde_json::to_vec(value)?),
            value: value.clone(),
        };

        // Write beside the target and rename over it so readers never see a partial file.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        serde_json::to_writer(&mut tmp, &envelope)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| PersistError::Io(e.error))?;

        tracing::trace!(key, path = %path.display(), "wrote value");
        Ok(())
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
