//! Requester-facing request handling.
//!
//! One `impl DAppArbiter` block per request kind lives in its own file; this
//! module holds the wire types, the shared collaborators and the dispatcher.

mod broadcast;
mod operation;
mod permission;
mod sign;

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{ChainRpc, OperationParser, PendingLedger, Vault};
use crate::confirm::{ApprovedAccount, ConfirmationOrchestrator, ConfirmationPayload, Decision};
use crate::error::DAppError;
use crate::network::NetworkRegistry;
use crate::session::{DAppSession, SessionStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    #[serde(default)]
    pub network: Value,
    #[serde(default)]
    pub app_meta: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    #[serde(default)]
    pub source_pkh: String,
    #[serde(default)]
    pub op_params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    #[serde(default)]
    pub source_pkh: String,
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    #[serde(default)]
    pub signed_op_bytes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DAppRequest {
    GetCurrentPermissionRequest,
    PermissionRequest(PermissionRequest),
    OperationRequest(OperationRequest),
    SignRequest(SignRequest),
    BroadcastRequest(BroadcastRequest),
}

/// What a granted origin may use: the network RPC and the bound account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub rpc: String,
    pub pkh: String,
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum DAppResponse {
    GetCurrentPermissionResponse { permission: Option<PermissionGrant> },
    PermissionResponse(PermissionGrant),
    OperationResponse { op_hash: String },
    SignResponse { signature: String },
    BroadcastResponse { op_hash: String },
}

/// Backends the arbiter acts through once a request is allowed.
#[derive(Clone)]
pub struct Collaborators {
    pub vault: Arc<dyn Vault>,
    pub rpc: Arc<dyn ChainRpc>,
    pub parser: Arc<dyn OperationParser>,
    pub ledger: Arc<dyn PendingLedger>,
}

pub struct DAppArbiter {
    sessions: Arc<SessionStore>,
    networks: NetworkRegistry,
    orchestrator: ConfirmationOrchestrator,
    backends: Collaborators,
}

impl DAppArbiter {
    pub fn new(
        sessions: Arc<SessionStore>,
        networks: NetworkRegistry,
        orchestrator: ConfirmationOrchestrator,
        backends: Collaborators,
    ) -> Self {
        Self {
            sessions,
            networks,
            orchestrator,
            backends,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn orchestrator(&self) -> &ConfirmationOrchestrator {
        &self.orchestrator
    }

    pub fn networks(&self) -> &NetworkRegistry {
        &self.networks
    }

    /// Dispatch a requester message by kind.
    pub async fn handle_request(
        &self,
        origin: &str,
        request: DAppRequest,
    ) -> Result<DAppResponse, DAppError> {
        match request {
            DAppRequest::GetCurrentPermissionRequest => {
                Ok(DAppResponse::GetCurrentPermissionResponse {
                    permission: self.get_current_permission(origin).await?,
                })
            }
            DAppRequest::PermissionRequest(req) => self
                .request_permission(origin, req)
                .await
                .map(DAppResponse::PermissionResponse),
            DAppRequest::OperationRequest(req) => self
                .request_operation(origin, req)
                .await
                .map(|op_hash| DAppResponse::OperationResponse { op_hash }),
            DAppRequest::SignRequest(req) => self
                .request_sign(origin, req)
                .await
                .map(|signature| DAppResponse::SignResponse { signature }),
            DAppRequest::BroadcastRequest(req) => self
                .request_broadcast(origin, req)
                .await
                .map(|op_hash| DAppResponse::BroadcastResponse { op_hash }),
        }
    }

    /// Session of `origin`, which must be bound to `source_pkh`.
    async fn session_for(&self, origin: &str, source_pkh: &str) -> Result<DAppSession, DAppError> {
        let session = self
            .sessions
            .get(origin)
            .await?
            .ok_or(DAppError::NotGranted)?;
        if session.pkh != source_pkh {
            return Err(DAppError::NotFound);
        }
        Ok(session)
    }

    /// Ask the user about `payload` and run `action` if they approve.
    ///
    /// Once approved, the action runs on its own task. A requester that
    /// goes away can abandon a pending confirmation, never an approved
    /// action. The outcome is reported to the surface before teardown.
    async fn confirm<T, F, Fut>(
        &self,
        payload: ConfirmationPayload,
        action: F,
    ) -> Result<T, DAppError>
    where
        T: Send + 'static,
        F: FnOnce(Option<ApprovedAccount>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, DAppError>> + Send + 'static,
    {
        let mut ticket = self.orchestrator.open(payload).await?;
        let mut approval = match ticket.decision().await {
            Decision::Approved(approval) => approval,
            Decision::Declined(reason) => {
                debug!(id = %ticket.id(), ?reason, "Request not granted");
                return Err(DAppError::NotGranted);
            }
        };

        let id = ticket.id();
        let task = tokio::spawn(async move {
            let outcome = action(approval.take_account()).await;
            approval.respond(
                outcome
                    .as_ref()
                    .map(|_| ())
                    .map_err(|e| e.to_payload().message),
            );
            ticket.finish().await;
            outcome
        });
        task.await.unwrap_or_else(|e| {
            warn!(%id, "Approved action did not complete: {}", e);
            Err(DAppError::ActionAborted(e.to_string()))
        })
    }
}
