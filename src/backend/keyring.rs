use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::storage::DocumentStorage;

use super::OriginKeyring;

pub const PUBLIC_KEYS_KEY: &str = "dapp_public_keys";

/// Per-origin key material kept in one document, origin → opaque value.
pub struct DocumentKeyring {
    storage: Arc<dyn DocumentStorage>,
    writer: Mutex<()>,
}

impl DocumentKeyring {
    pub fn new(storage: Arc<dyn DocumentStorage>) -> Self {
        Self {
            storage,
            writer: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, Value>, StorageError> {
        match self.storage.load(PUBLIC_KEYS_KEY).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| StorageError::Malformed {
                key: PUBLIC_KEYS_KEY.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(BTreeMap::new()),
        }
    }

    async fn persist(&self, keys: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        let value = serde_json::to_value(keys).map_err(|e| StorageError::Write {
            key: PUBLIC_KEYS_KEY.to_string(),
            reason: e.to_string(),
        })?;
        self.storage.store(PUBLIC_KEYS_KEY, &value).await
    }

    pub async fn get(&self, origin: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.load().await?.remove(origin))
    }

    pub async fn set(&self, origin: &str, material: Value) -> Result<(), StorageError> {
        let _guard = self.writer.lock().await;
        let _lock = self.storage.lock(PUBLIC_KEYS_KEY).await?;
        let mut keys = self.load().await?;
        keys.insert(origin.to_string(), material);
        self.persist(&keys).await
    }
}

#[async_trait]
impl OriginKeyring for DocumentKeyring {
    async fn remove_origin_keys(&self, origin: &str) -> Result<(), StorageError> {
        let _guard = self.writer.lock().await;
        let _lock = self.storage.lock(PUBLIC_KEYS_KEY).await?;
        let mut keys = self.load().await?;
        if keys.remove(origin).is_none() {
            return Ok(());
        }
        debug!(origin, "Removing origin key material");
        self.persist(&keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    #[tokio::test]
    async fn removes_only_the_given_origin() {
        let keyring = DocumentKeyring::new(Arc::new(MemoryStorage::new()));
        keyring
            .set("https://a.example", json!({"pk": "a"}))
            .await
            .unwrap();
        keyring
            .set("https://b.example", json!({"pk": "b"}))
            .await
            .unwrap();

        keyring.remove_origin_keys("https://a.example").await.unwrap();
        keyring.remove_origin_keys("https://missing.example").await.unwrap();

        assert!(keyring.get("https://a.example").await.unwrap().is_none());
        assert_eq!(
            keyring.get("https://b.example").await.unwrap(),
            Some(json!({"pk": "b"}))
        );
    }
}
