use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{LedgerError, StorageError};
use crate::storage::DocumentStorage;

use super::{PendingLedger, PendingOperation};

pub const PENDING_OPERATIONS_KEY: &str = "pending_operations";

type Ledger = BTreeMap<String, Vec<PendingOperation>>;

fn ledger_key(pkh: &str, chain_id: &str) -> String {
    format!("{chain_id}_{pkh}")
}

/// Pending operations per `(pkh, chain id)`, oldest first.
pub struct DocumentLedger {
    storage: Arc<dyn DocumentStorage>,
    writer: Mutex<()>,
}

impl DocumentLedger {
    pub fn new(storage: Arc<dyn DocumentStorage>) -> Self {
        Self {
            storage,
            writer: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Ledger, StorageError> {
        match self.storage.load(PENDING_OPERATIONS_KEY).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| StorageError::Malformed {
                key: PENDING_OPERATIONS_KEY.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(Ledger::new()),
        }
    }

    async fn persist(&self, ledger: &Ledger) -> Result<(), StorageError> {
        let value = serde_json::to_value(ledger).map_err(|e| StorageError::Write {
            key: PENDING_OPERATIONS_KEY.to_string(),
            reason: e.to_string(),
        })?;
        self.storage.store(PENDING_OPERATIONS_KEY, &value).await
    }

    /// Read-modify-write one account's entries. Empty lists are dropped.
    async fn update<T>(
        &self,
        pkh: &str,
        chain_id: &str,
        f: impl FnOnce(&mut Vec<PendingOperation>) -> T,
    ) -> Result<T, LedgerError> {
        let _guard = self.writer.lock().await;
        let _lock = self.storage.lock(PENDING_OPERATIONS_KEY).await?;
        let mut ledger = self.load().await?;
        let key = ledger_key(pkh, chain_id);
        let entries = ledger.entry(key.clone()).or_default();
        let out = f(entries);
        if entries.is_empty() {
            ledger.remove(&key);
        }
        self.persist(&ledger).await?;
        Ok(out)
    }

    pub async fn entries(
        &self,
        pkh: &str,
        chain_id: &str,
    ) -> Result<Vec<PendingOperation>, LedgerError> {
        Ok(self
            .load()
            .await?
            .remove(&ledger_key(pkh, chain_id))
            .unwrap_or_default())
    }

    /// Drop entries whose hash was confirmed on chain. Returns how many went.
    pub async fn remove(
        &self,
        pkh: &str,
        chain_id: &str,
        hashes: &[String],
    ) -> Result<usize, LedgerError> {
        self.update(pkh, chain_id, |entries| {
            let before = entries.len();
            entries.retain(|op| !hashes.contains(&op.hash));
            before - entries.len()
        })
        .await
    }

    /// Drop entries added before `cutoff`. Returns how many went.
    pub async fn prune_older_than(
        &self,
        pkh: &str,
        chain_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, LedgerError> {
        let removed = self
            .update(pkh, chain_id, |entries| {
                let before = entries.len();
                entries.retain(|op| op.added_at >= cutoff);
                before - entries.len()
            })
            .await?;
        if removed > 0 {
            debug!(pkh, chain_id, removed, "Pruned expired pending operations");
        }
        Ok(removed)
    }
}

#[async_trait]
impl PendingLedger for DocumentLedger {
    async fn append(
        &self,
        pkh: &str,
        chain_id: &str,
        op: PendingOperation,
    ) -> Result<(), LedgerError> {
        self.update(pkh, chain_id, |entries| entries.push(op)).await
    }
}
