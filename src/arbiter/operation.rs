use serde_json::Value;
use tracing::{info, warn};

use crate::backend::{PendingOperation, SentOperation};
use crate::confirm::ConfirmationPayload;
use crate::error::DAppError;
use crate::validate;

use super::{Collaborators, DAppArbiter, OperationRequest};

impl DAppArbiter {
    /// Submit operations from the origin's account after user approval.
    /// Returns the operation hash.
    pub async fn request_operation(
        &self,
        origin: &str,
        req: OperationRequest,
    ) -> Result<String, DAppError> {
        validate::source_pkh(&req.source_pkh)?;
        validate::op_params(&req.op_params)?;

        let session = self.session_for(origin, &req.source_pkh).await?;
        let network_rpc = self.networks.rpc_for(&session.network)?;

        let payload = ConfirmationPayload::ConfirmOperations {
            origin: origin.to_string(),
            network_rpc: network_rpc.clone(),
            app_meta: session.app_meta.clone(),
            source_pkh: session.pkh.clone(),
            source_public_key: session.public_key.clone(),
            op_params: req.op_params.clone(),
        };
        let backends = self.backends.clone();
        let origin = origin.to_string();
        self.confirm(payload, move |_| async move {
            let sent = backends
                .vault
                .send_operations(&session.pkh, &network_rpc, &req.op_params)
                .await?;
            info!(origin = %origin, hash = %sent.hash, "Operations submitted");
            backends
                .record_pending(&session.pkh, &network_rpc, &sent, &req.op_params)
                .await;
            Ok::<_, DAppError>(sent.hash)
        })
        .await
    }
}

impl Collaborators {
    /// One ledger entry per successful submission. Failures are logged only;
    /// the operation is already on its way.
    async fn record_pending(
        &self,
        pkh: &str,
        network_rpc: &str,
        sent: &SentOperation,
        op_params: &[Value],
    ) {
        let chain_id = match self.rpc.chain_id(network_rpc).await {
            Ok(chain_id) => chain_id,
            Err(e) => {
                warn!(pkh, hash = %sent.hash, "Skipping pending ledger entry: {}", e);
                return;
            }
        };
        let entry = PendingOperation::from_sent(sent, op_params);
        if let Err(e) = self.ledger.append(pkh, &chain_id, entry).await {
            warn!(pkh, hash = %sent.hash, "Failed to record pending operation: {}", e);
        }
    }
}
