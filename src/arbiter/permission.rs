use std::sync::Arc;

use tracing::{debug, info};

use crate::confirm::ConfirmationPayload;
use crate::error::DAppError;
use crate::session::DAppSession;
use crate::validate;

use super::{DAppArbiter, PermissionGrant, PermissionRequest};

impl DAppArbiter {
    /// Current grant of `origin`, if any. Never prompts.
    pub async fn get_current_permission(
        &self,
        origin: &str,
    ) -> Result<Option<PermissionGrant>, DAppError> {
        match self.sessions.get(origin).await? {
            Some(session) => Ok(Some(self.grant_for(session)?)),
            None => Ok(None),
        }
    }

    /// Grant `origin` access to one account, asking the user unless an
    /// equivalent grant already exists.
    pub async fn request_permission(
        &self,
        origin: &str,
        req: PermissionRequest,
    ) -> Result<PermissionGrant, DAppError> {
        let network = validate::permission_network(&req.network, &self.networks)?;
        let app_meta = validate::app_meta(&req.app_meta)?;
        let network_rpc = self.networks.rpc_for(&network)?;

        if !req.force.unwrap_or(false)
            && let Some(session) = self.sessions.get(origin).await?
            && session.network.same_as(&network)
            && session.app_meta.name == app_meta.name
        {
            debug!(origin, "Reusing existing permission");
            return self.grant_for(session);
        }

        let payload = ConfirmationPayload::Connect {
            origin: origin.to_string(),
            network_rpc: network_rpc.clone(),
            app_meta: app_meta.clone(),
        };
        let sessions = Arc::clone(&self.sessions);
        let origin = origin.to_string();
        self.confirm(payload, move |account| async move {
            let account = account.ok_or(DAppError::NotGranted)?;
            let session = DAppSession {
                network,
                app_meta,
                pkh: account.pkh,
                public_key: account.public_key,
            };
            sessions.set(&origin, session.clone()).await?;
            info!(origin = %origin, pkh = %session.pkh, "Permission granted");
            Ok::<_, DAppError>(PermissionGrant {
                rpc: network_rpc,
                pkh: session.pkh,
                public_key: session.public_key,
            })
        })
        .await
    }

    fn grant_for(&self, session: DAppSession) -> Result<PermissionGrant, DAppError> {
        Ok(PermissionGrant {
            rpc: self.networks.rpc_for(&session.network)?,
            pkh: session.pkh,
            public_key: session.public_key,
        })
    }
}
