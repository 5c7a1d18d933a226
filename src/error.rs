//! Error types for tezgate.

use serde::Serialize;

/// Top-level error type for the gateway process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("DApp error: {0}")]
    DApp(#[from] DAppError),
}

/// Failures surfaced to requesting applications.
///
/// The first four variants form the stable requester-facing taxonomy. The
/// remaining ones are collaborator failures that propagate unchanged.
#[derive(Debug, thiserror::Error)]
pub enum DAppError {
    #[error("Invalid params: {0}")]
    InvalidParams(&'static str),

    #[error("Not granted")]
    NotGranted,

    #[error("Account not found in session")]
    NotFound,

    #[error("Tezos operation failed")]
    TezosOperation,

    #[error("Failed to broadcast")]
    BroadcastFailed,

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Vault error: {0}")]
    Vault(VaultError),

    #[error("Approval surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Approved action aborted: {0}")]
    ActionAborted(String),
}

/// Structured error payload returned to requesters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DAppErrorPayload {
    pub error: &'static str,
    pub retryable: bool,
    pub message: String,
}

impl DAppError {
    /// Stable wire code. Callers must not depend on `Display` text.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "INVALID_PARAMS",
            Self::NotGranted => "NOT_GRANTED",
            Self::NotFound => "NOT_FOUND",
            Self::TezosOperation => "TEZOS_OPERATION",
            Self::BroadcastFailed => "BROADCAST_FAILED",
            Self::UnknownNetwork(_)
            | Self::Storage(_)
            | Self::Vault(_)
            | Self::Surface(_)
            | Self::ActionAborted(_) => "INTERNAL",
        }
    }

    /// Whether the requester may retry the same request as-is.
    ///
    /// `NotGranted` is retryable after re-establishing a connection; the
    /// others need different input or a new permission grant.
    pub fn retryable(&self) -> bool {
        match self {
            Self::NotGranted | Self::BroadcastFailed | Self::Storage(_) | Self::Surface(_) => true,
            Self::Vault(err) => matches!(err, VaultError::Locked | VaultError::Unavailable(_)),
            Self::InvalidParams(_)
            | Self::NotFound
            | Self::TezosOperation
            | Self::UnknownNetwork(_)
            | Self::ActionAborted(_) => false,
        }
    }

    pub fn to_payload(&self) -> DAppErrorPayload {
        let message = match self {
            // Node text is deliberately replaced by the stable code.
            Self::TezosOperation => "TEZOS_OPERATION".to_string(),
            other => other.to_string(),
        };
        DAppErrorPayload {
            error: self.code(),
            retryable: self.retryable(),
            message,
        }
    }
}

impl From<VaultError> for DAppError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::TezosOperation(_) => Self::TezosOperation,
            other => Self::Vault(other),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Document storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed reading document {key}: {reason}")]
    Read { key: String, reason: String },

    #[error("Failed writing document {key}: {reason}")]
    Write { key: String, reason: String },

    #[error("Document {key} is malformed: {reason}")]
    Malformed { key: String, reason: String },

    #[error("Invalid document key: {0}")]
    InvalidKey(String),
}

/// Vault (key custody) errors.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Vault is locked")]
    Locked,

    #[error("No key for account {0}")]
    UnknownAccount(String),

    #[error("Operation rejected by the node: {0}")]
    TezosOperation(String),

    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    #[error("Vault request failed: {0}")]
    Failed(String),
}

/// Blockchain RPC errors.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Node rejected the operation: {0}")]
    Operation(String),

    #[error("RPC request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Invalid RPC response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

/// Payload decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("Unexpected end of input at byte {0}")]
    UnexpectedEnd(usize),

    #[error("Unknown tag 0x{tag:02x} at byte {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("Invalid payload: {0}")]
    Invalid(String),

    #[error("Operation parse failed: {0}")]
    Rpc(#[from] RpcError),
}

/// Pending-operation ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Approval surface host errors.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("Failed to open approval surface: {0}")]
    OpenFailed(String),
}

/// Gateway server errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway failed to start: {reason}")]
    StartupFailed { reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_requester_codes() {
        assert_eq!(DAppError::InvalidParams("x").code(), "INVALID_PARAMS");
        assert_eq!(DAppError::NotGranted.code(), "NOT_GRANTED");
        assert_eq!(DAppError::NotFound.code(), "NOT_FOUND");
        assert_eq!(DAppError::TezosOperation.code(), "TEZOS_OPERATION");
        assert_eq!(DAppError::BroadcastFailed.code(), "BROADCAST_FAILED");
        assert_eq!(
            DAppError::UnknownNetwork("edonet".to_string()).code(),
            "INTERNAL"
        );
    }

    #[test]
    fn vault_operation_failures_are_relabeled() {
        let err = DAppError::from(VaultError::TezosOperation(
            "proto.alpha.contract.balance_too_low".to_string(),
        ));
        assert!(matches!(err, DAppError::TezosOperation));

        let payload = err.to_payload();
        assert_eq!(payload.error, "TEZOS_OPERATION");
        assert!(!payload.message.contains("balance_too_low"));
        assert!(!payload.retryable);
    }

    #[test]
    fn other_vault_failures_propagate_unchanged() {
        let err = DAppError::from(VaultError::Locked);
        assert!(matches!(err, DAppError::Vault(VaultError::Locked)));
        assert!(err.retryable());
    }

    #[test]
    fn not_granted_is_retryable_not_found_is_not() {
        assert!(DAppError::NotGranted.retryable());
        assert!(!DAppError::NotFound.retryable());
        assert!(!DAppError::InvalidParams("payload").retryable());
    }
}
