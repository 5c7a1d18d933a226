//! Keyed JSON document persistence.
//!
//! Every collaborator that persists state (sessions, the pending-operation
//! ledger, per-origin key material) reads and rewrites whole documents
//! addressed by a fixed key. `FileStorage` keeps one pretty-printed JSON file
//! per key; `MemoryStorage` backs tests and ephemeral runs.
//!
//! Writers hold [`DocumentStorage::lock`] across each read-modify-write. For
//! `FileStorage` that is an advisory lock on `<key>.lock`, so a gateway and
//! a CLI sharing one data directory serialize their updates.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use fs4::FileExt;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::StorageError;

#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Load a document. Missing documents are `Ok(None)`.
    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Persist a document, replacing any previous value.
    async fn store(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Delete a document. Deleting a missing document is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Hold `key` exclusively until the returned guard drops.
    ///
    /// Only needed where several processes share the backing store; the
    /// default is a no-op.
    async fn lock(&self, _key: &str) -> Result<DocumentLock, StorageError> {
        Ok(DocumentLock::default())
    }
}

/// Exclusive hold on one document. Dropping it releases the lock.
#[derive(Debug, Default)]
pub struct DocumentLock {
    _file: Option<std::fs::File>,
}

/// One `<key>.json` file per document under a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl DocumentStorage for FileStorage {
    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key)?;
        let data = match tokio::fs::read(&path).await {
            Ok(v) => v,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StorageError::Read {
                    key: key.to_string(),
                    reason: err.to_string(),
                });
            }
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| StorageError::Malformed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn store(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let write_err = |reason: String| StorageError::Write {
            key: key.to_string(),
            reason,
        };
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| write_err(format!("failed creating store dir: {e}")))?;
        let serialized = serde_json::to_vec_pretty(value)
            .map_err(|e| write_err(format!("failed serializing document: {e}")))?;

        // Write-then-rename so a crash never leaves a truncated document.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serialized)
            .await
            .map_err(|e| write_err(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| write_err(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Write {
                key: key.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    async fn lock(&self, key: &str) -> Result<DocumentLock, StorageError> {
        let path = self.path_for(key)?.with_extension("lock");
        let dir = self.dir.clone();
        let lock_err = |reason: String| StorageError::Write {
            key: key.to_string(),
            reason: format!("failed locking document: {reason}"),
        };

        // flock blocks the calling thread until the holder lets go.
        let file = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| lock_err(e.to_string()))?
        .map_err(|e| lock_err(e.to_string()))?;

        Ok(DocumentLock { _file: Some(file) })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    documents: RwLock<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStorage for MemoryStorage {
    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn store(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.documents
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.documents.write().await.remove(key);
        Ok(())
    }
}

/// Default data directory (~/.tezgate/data).
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tezgate")
        .join("data")
}
