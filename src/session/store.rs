//! Persisted origin → session map.
//!
//! The whole map lives in one document and is rewritten on every mutation.
//! Mutations hold the in-process writer lock and the storage lock on the
//! document, so concurrent `set`/`remove` calls cannot lose each other's
//! updates, even from another process sharing the data directory.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::OriginKeyring;
use crate::error::StorageError;
use crate::storage::DocumentStorage;

use super::DAppSession;

/// Fixed storage key of the sessions document.
pub const SESSIONS_KEY: &str = "dapp_sessions";

pub type DAppSessions = BTreeMap<String, DAppSession>;

pub struct SessionStore {
    storage: Arc<dyn DocumentStorage>,
    keyring: Arc<dyn OriginKeyring>,
    writer: Mutex<()>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn DocumentStorage>, keyring: Arc<dyn OriginKeyring>) -> Self {
        Self {
            storage,
            keyring,
            writer: Mutex::new(()),
        }
    }

    pub async fn get_all(&self) -> Result<DAppSessions, StorageError> {
        match self.storage.load(SESSIONS_KEY).await? {
            Some(value) => {
                serde_json::from_value(value).map_err(|e| StorageError::Malformed {
                    key: SESSIONS_KEY.to_string(),
                    reason: e.to_string(),
                })
            }
            None => Ok(DAppSessions::new()),
        }
    }

    pub async fn get(&self, origin: &str) -> Result<Option<DAppSession>, StorageError> {
        Ok(self.get_all().await?.remove(origin))
    }

    /// Create or replace the session for `origin`. Returns the updated map.
    pub async fn set(
        &self,
        origin: &str,
        session: DAppSession,
    ) -> Result<DAppSessions, StorageError> {
        let _guard = self.writer.lock().await;
        let _lock = self.storage.lock(SESSIONS_KEY).await?;
        let mut sessions = self.get_all().await?;
        sessions.insert(origin.to_string(), session);
        self.persist(&sessions).await?;
        info!(origin, "DApp session stored");
        Ok(sessions)
    }

    /// Delete the session for `origin` and its out-of-band key material.
    /// Returns the remaining map.
    pub async fn remove(&self, origin: &str) -> Result<DAppSessions, StorageError> {
        let sessions = {
            let _guard = self.writer.lock().await;
            let _lock = self.storage.lock(SESSIONS_KEY).await?;
            let mut sessions = self.get_all().await?;
            if sessions.remove(origin).is_none() {
                debug!(origin, "No DApp session to remove");
            }
            self.persist(&sessions).await?;
            sessions
        };

        if let Err(e) = self.keyring.remove_origin_keys(origin).await {
            warn!(origin, "Failed to clean up origin key material: {}", e);
        }
        info!(origin, "DApp session removed");
        Ok(sessions)
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.writer.lock().await;
        let _lock = self.storage.lock(SESSIONS_KEY).await?;
        self.persist(&DAppSessions::new()).await?;
        info!("All DApp sessions cleared");
        Ok(())
    }

    async fn persist(&self, sessions: &DAppSessions) -> Result<(), StorageError> {
        let value = serde_json::to_value(sessions).map_err(|e| StorageError::Write {
            key: SESSIONS_KEY.to_string(),
            reason: format!("failed serializing sessions: {e}"),
        })?;
        self.storage.store(SESSIONS_KEY, &value).await
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use crate::network::DAppNetwork;
    use crate::session::AppMeta;
    use crate::storage::{FileStorage, MemoryStorage};

    #[derive(Default)]
    struct CountingKeyring {
        removed: std::sync::Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OriginKeyring for CountingKeyring {
        async fn remove_origin_keys(&self, origin: &str) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.removed.lock().unwrap().push(origin.to_string());
            Ok(())
        }
    }

    fn session(pkh: &str) -> DAppSession {
        DAppSession {
            network: DAppNetwork::Known("ghostnet".to_string()),
            app_meta: AppMeta::named("Example"),
            pkh: pkh.to_string(),
            public_key: "edpkexample".to_string(),
        }
    }

    fn store() -> (SessionStore, Arc<CountingKeyring>) {
        let keyring = Arc::new(CountingKeyring::default());
        let store = SessionStore::new(Arc::new(MemoryStorage::new()), keyring.clone());
        (store, keyring)
    }

    #[tokio::test]
    async fn set_then_get_returns_the_session() {
        let (store, _) = store();
        let s = session("tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb");
        store.set("https://a.example", s.clone()).await.unwrap();
        assert_eq!(store.get("https://a.example").await.unwrap(), Some(s));
        assert_eq!(store.get("https://b.example").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_then_get_is_absent_and_cleans_keys() {
        let (store, keyring) = store();
        store.set("https://a.example", session("tz1a")).await.unwrap();
        store.set("https://b.example", session("tz1b")).await.unwrap();

        let rest = store.remove("https://a.example").await.unwrap();
        assert_eq!(rest.keys().cloned().collect::<Vec<_>>(), vec!["https://b.example"]);
        assert_eq!(store.get("https://a.example").await.unwrap(), None);
        assert_eq!(
            keyring.removed.lock().unwrap().as_slice(),
            &["https://a.example".to_string()]
        );
    }

    #[tokio::test]
    async fn set_replaces_existing_session() {
        let (store, _) = store();
        store.set("https://a.example", session("tz1old")).await.unwrap();
        store.set("https://a.example", session("tz1new")).await.unwrap();
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["https://a.example"].pkh, "tz1new");
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let (store, keyring) = store();
        store.set("https://a.example", session("tz1a")).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
        assert_eq!(keyring.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_lose_updates() {
        let (store, _) = store();
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .set(&format!("https://{i}.example"), session(&format!("tz1{i}")))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get_all().await.unwrap().len(), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stores_sharing_a_data_dir_do_not_lose_updates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let open = || {
            Arc::new(SessionStore::new(
                Arc::new(FileStorage::new(dir.path())),
                Arc::new(CountingKeyring::default()),
            ))
        };
        // A gateway and a CLI, each with its own writer lock.
        let (gateway, cli) = (open(), open());
        cli.set("https://gone.example", session("tz1gone")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let gateway = Arc::clone(&gateway);
            handles.push(tokio::spawn(async move {
                gateway
                    .set(&format!("https://{i}.example"), session(&format!("tz1{i}")))
                    .await
                    .unwrap();
            }));
        }
        let remover = Arc::clone(&cli);
        handles.push(tokio::spawn(async move {
            remover.remove("https://gone.example").await.unwrap();
        }));
        for handle in handles {
            handle.await.unwrap();
        }

        let all = open().get_all().await.unwrap();
        assert_eq!(all.len(), 8);
        assert!(!all.contains_key("https://gone.example"));
    }

    #[test]
    fn sessions_document_uses_camel_case() {
        let mut sessions = DAppSessions::new();
        sessions.insert("https://a.example".to_string(), session("tz1a"));
        let value = serde_json::to_value(&sessions).unwrap();
        let entry = &value["https://a.example"];
        assert_eq!(entry["publicKey"], "edpkexample");
        assert_eq!(entry["appMeta"]["name"], "Example");
        let parsed: DAppSessions = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, sessions);
    }
}
