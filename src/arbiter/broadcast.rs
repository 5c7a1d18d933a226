use tracing::{info, warn};

use crate::error::{DAppError, RpcError};
use crate::validate;

use super::{BroadcastRequest, DAppArbiter};

impl DAppArbiter {
    /// Inject already-signed bytes on the origin's network. No prompt.
    pub async fn request_broadcast(
        &self,
        origin: &str,
        req: BroadcastRequest,
    ) -> Result<String, DAppError> {
        validate::signed_op_bytes(&req.signed_op_bytes)?;
        let session = self
            .sessions
            .get(origin)
            .await?
            .ok_or(DAppError::NotGranted)?;
        let rpc = self.networks.rpc_for(&session.network)?;

        match self
            .backends
            .rpc
            .inject_operation(&rpc, &req.signed_op_bytes)
            .await
        {
            Ok(hash) => {
                info!(origin, hash = %hash, "Operation broadcast");
                Ok(hash)
            }
            Err(RpcError::Operation(reason)) => {
                warn!(origin, "Node rejected broadcast: {}", reason);
                Err(DAppError::TezosOperation)
            }
            Err(e) => {
                warn!(origin, "Broadcast failed: {}", e);
                Err(DAppError::BroadcastFailed)
            }
        }
    }
}
