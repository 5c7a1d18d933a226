//! Messages exchanged with approval surfaces.

use serde::{Deserialize, Serialize};

use crate::confirm::{ConfirmationId, ConfirmationPayload};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntercomRequest {
    #[serde(rename = "TEMPLE_DAPP_GET_PAYLOAD_REQUEST")]
    GetPayload { id: ConfirmationId },

    #[serde(
        rename = "TEMPLE_DAPP_PERM_CONFIRMATION_REQUEST",
        rename_all = "camelCase"
    )]
    PermConfirmation {
        id: ConfirmationId,
        confirmed: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account_public_key_hash: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account_public_key: Option<String>,
    },

    #[serde(rename = "TEMPLE_DAPP_OPS_CONFIRMATION_REQUEST")]
    OpsConfirmation { id: ConfirmationId, confirmed: bool },

    #[serde(rename = "TEMPLE_DAPP_SIGN_CONFIRMATION_REQUEST")]
    SignConfirmation { id: ConfirmationId, confirmed: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntercomResponse {
    #[serde(rename = "TEMPLE_DAPP_GET_PAYLOAD_RESPONSE")]
    GetPayload { payload: ConfirmationPayload },

    #[serde(rename = "TEMPLE_DAPP_PERM_CONFIRMATION_RESPONSE")]
    PermConfirmation,

    #[serde(rename = "TEMPLE_DAPP_OPS_CONFIRMATION_RESPONSE")]
    OpsConfirmation,

    #[serde(rename = "TEMPLE_DAPP_SIGN_CONFIRMATION_RESPONSE")]
    SignConfirmation,
}

impl IntercomRequest {
    pub fn id(&self) -> ConfirmationId {
        match self {
            Self::GetPayload { id }
            | Self::PermConfirmation { id, .. }
            | Self::OpsConfirmation { id, .. }
            | Self::SignConfirmation { id, .. } => *id,
        }
    }
}
