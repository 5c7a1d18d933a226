//! Human approval of requester actions.
//!
//! A confirmation opens an approval surface, hands it a typed payload over
//! the intercom channel and waits for exactly one decision. See
//! [`ConfirmationOrchestrator`] for the lifecycle.

mod orchestrator;
mod surface;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::preview::SignPreview;
use crate::session::AppMeta;

pub use orchestrator::{
    ApprovedAccount, Approval, ConfirmationOrchestrator, ConfirmationTicket, Decision,
    DeclineReason, OrchestratorSettings,
};
pub use surface::{
    BrowserSurfaceHost, Bounds, SurfaceGeometry, SurfaceHandle, SurfaceHost, SurfaceSpec,
};

/// Correlation id binding an approval surface to one pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationId(Uuid);

impl ConfirmationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConfirmationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConfirmationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ConfirmationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One intercom connection from an approval surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(Uuid);

impl PortId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PortId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What the approval surface shows the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ConfirmationPayload {
    Connect {
        origin: String,
        network_rpc: String,
        app_meta: AppMeta,
    },
    ConfirmOperations {
        origin: String,
        network_rpc: String,
        app_meta: AppMeta,
        source_pkh: String,
        source_public_key: String,
        op_params: Vec<Value>,
    },
    Sign {
        origin: String,
        network_rpc: String,
        app_meta: AppMeta,
        source_pkh: String,
        payload: String,
        preview: Option<SignPreview>,
    },
}

impl ConfirmationPayload {
    pub fn origin(&self) -> &str {
        match self {
            Self::Connect { origin, .. }
            | Self::ConfirmOperations { origin, .. }
            | Self::Sign { origin, .. } => origin,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::ConfirmOperations { .. } => "confirm_operations",
            Self::Sign { .. } => "sign",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_wire_shape() {
        let payload = ConfirmationPayload::ConfirmOperations {
            origin: "https://app.example".to_string(),
            network_rpc: "https://rpc.example".to_string(),
            app_meta: AppMeta::named("App"),
            source_pkh: "tz1a".to_string(),
            source_public_key: "edpk".to_string(),
            op_params: vec![json!({"kind": "transaction"})],
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "confirm_operations");
        assert_eq!(value["networkRpc"], "https://rpc.example");
        assert_eq!(value["sourcePublicKey"], "edpk");
        assert_eq!(value["opParams"][0]["kind"], "transaction");
        assert_eq!(payload.origin(), "https://app.example");
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ConfirmationId::new(), ConfirmationId::new());
        assert_ne!(PortId::new(), PortId::new());
    }
}
