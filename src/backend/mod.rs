//! Collaborators the approval protocol talks to.
//!
//! The protocol core only sees these traits. Thin adapters over a Tezos node
//! (`rpc`), a remote signer (`vault`) and the document store (`ledger`,
//! `keyring`) make the binary usable end to end.

mod keyring;
mod ledger;
mod rpc;
mod vault;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ForgeError, LedgerError, RpcError, StorageError, VaultError};

pub use keyring::{DocumentKeyring, PUBLIC_KEYS_KEY};
pub use ledger::{DocumentLedger, PENDING_OPERATIONS_KEY};
pub use rpc::TezosRpcClient;
pub use vault::HttpVault;

/// Result of a vault-submitted operation group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentOperation {
    pub hash: String,
    /// Per-operation results as reported by the vault. Opaque here.
    #[serde(default)]
    pub results: Vec<Value>,
}

/// Operation group decoded from forged bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedOperation {
    pub branch: String,
    #[serde(default)]
    pub contents: Vec<Value>,
}

/// Ledger entry for a submitted operation awaiting inclusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub hash: String,
    pub kind: String,
    #[serde(default)]
    pub results: Vec<Value>,
    pub added_at: DateTime<Utc>,
}

impl PendingOperation {
    /// Build an entry from a vault submission. The kind is taken from the
    /// first operation of the group.
    pub fn from_sent(sent: &SentOperation, op_params: &[Value]) -> Self {
        let kind = op_params
            .first()
            .and_then(|op| op.get("kind"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        Self {
            hash: sent.hash.clone(),
            kind,
            results: sent.results.clone(),
            added_at: Utc::now(),
        }
    }
}

/// Key custody, signing and operation submission.
#[async_trait]
pub trait Vault: Send + Sync {
    /// Estimate, forge, sign and inject `op_params` from `pkh` through `rpc`.
    async fn send_operations(
        &self,
        pkh: &str,
        rpc: &str,
        op_params: &[Value],
    ) -> Result<SentOperation, VaultError>;

    /// Sign hex `bytes` with the key of `pkh`. Returns a prefixed signature.
    async fn sign(&self, pkh: &str, bytes: &str) -> Result<String, VaultError>;
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn chain_id(&self, rpc: &str) -> Result<String, RpcError>;

    /// Inject signed operation bytes. Returns the operation hash.
    async fn inject_operation(&self, rpc: &str, signed_bytes: &str) -> Result<String, RpcError>;
}

#[async_trait]
pub trait OperationParser: Send + Sync {
    async fn parse_operation(&self, rpc: &str, bytes: &str)
    -> Result<ParsedOperation, ForgeError>;
}

#[async_trait]
pub trait PendingLedger: Send + Sync {
    async fn append(
        &self,
        pkh: &str,
        chain_id: &str,
        op: PendingOperation,
    ) -> Result<(), LedgerError>;
}

/// Out-of-band key material held per origin (e.g. pairing keys).
#[async_trait]
pub trait OriginKeyring: Send + Sync {
    async fn remove_origin_keys(&self, origin: &str) -> Result<(), StorageError>;
}

/// Keyring for deployments that keep no per-origin key material.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopKeyring;

#[async_trait]
impl OriginKeyring for NoopKeyring {
    async fn remove_origin_keys(&self, _origin: &str) -> Result<(), StorageError> {
        Ok(())
    }
}
