use std::sync::Arc;

use tracing::info;

use crate::confirm::ConfirmationPayload;
use crate::error::DAppError;
use crate::preview::build_sign_preview;
use crate::validate;

use super::{DAppArbiter, SignRequest};

impl DAppArbiter {
    /// Sign raw bytes with the origin's account after user approval.
    /// Returns the prefixed signature.
    pub async fn request_sign(&self, origin: &str, req: SignRequest) -> Result<String, DAppError> {
        let payload = validate::sign_payload(&req.payload)?;
        validate::source_pkh(&req.source_pkh)?;

        let session = self.session_for(origin, &req.source_pkh).await?;
        let network_rpc = self.networks.rpc_for(&session.network)?;
        let preview =
            build_sign_preview(self.backends.parser.as_ref(), &network_rpc, &payload).await;

        let confirmation = ConfirmationPayload::Sign {
            origin: origin.to_string(),
            network_rpc,
            app_meta: session.app_meta.clone(),
            source_pkh: session.pkh.clone(),
            payload: payload.clone(),
            preview,
        };
        let vault = Arc::clone(&self.backends.vault);
        let origin = origin.to_string();
        self.confirm(confirmation, move |_| async move {
            let signature = vault.sign(&session.pkh, &payload).await?;
            info!(origin = %origin, pkh = %session.pkh, "Payload signed");
            Ok::<_, DAppError>(signature)
        })
        .await
    }
}
