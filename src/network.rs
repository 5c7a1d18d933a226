//! Known networks and network descriptors supplied by requesters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DAppError;

/// A network entry the wallet knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownNetwork {
    pub id: String,
    pub name: String,
    pub rpc_base_url: String,
    /// Disabled networks resolve for existing sessions but cannot be granted.
    #[serde(default)]
    pub disabled: bool,
}

impl KnownNetwork {
    fn new(id: &str, name: &str, rpc_base_url: &str, disabled: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            rpc_base_url: rpc_base_url.to_string(),
            disabled,
        }
    }
}

pub fn default_networks() -> Vec<KnownNetwork> {
    vec![
        KnownNetwork::new("mainnet", "Tezos Mainnet", "https://mainnet.api.tez.ie", false),
        KnownNetwork::new(
            "ghostnet",
            "Ghostnet Testnet",
            "https://ghostnet.ecadinfra.com",
            false,
        ),
        KnownNetwork::new("sandbox", "Local Sandbox", "http://localhost:8732", false),
        KnownNetwork::new(
            "jakartanet",
            "Jakartanet Testnet",
            "https://jakartanet.ecadinfra.com",
            true,
        ),
    ]
}

/// Network as asserted by a requester: a known id or an inline RPC descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DAppNetwork {
    Known(String),
    Custom(CustomNetwork),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomNetwork {
    pub rpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DAppNetwork {
    /// Same network for the permission fast path.
    ///
    /// Ids compare directly, inline descriptors compare by RPC endpoint, and
    /// an id never equals an inline descriptor.
    pub fn same_as(&self, other: &DAppNetwork) -> bool {
        match (self, other) {
            (Self::Known(a), Self::Known(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => a.rpc == b.rpc,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    networks: Vec<KnownNetwork>,
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::new(default_networks())
    }
}

impl NetworkRegistry {
    pub fn new(networks: Vec<KnownNetwork>) -> Self {
        Self { networks }
    }

    pub fn networks(&self) -> &[KnownNetwork] {
        &self.networks
    }

    pub fn find(&self, id: &str) -> Option<&KnownNetwork> {
        self.networks.iter().find(|n| n.id == id)
    }

    /// Whether a requester may be granted access on this network.
    pub fn is_allowed(&self, network: &DAppNetwork) -> bool {
        match network {
            DAppNetwork::Known(id) => self.find(id).is_some_and(|n| !n.disabled),
            DAppNetwork::Custom(custom) => !custom.rpc.trim().is_empty(),
        }
    }

    pub fn rpc_for(&self, network: &DAppNetwork) -> Result<String, DAppError> {
        match network {
            DAppNetwork::Known(id) => self
                .find(id)
                .map(|n| n.rpc_base_url.clone())
                .ok_or_else(|| DAppError::UnknownNetwork(id.clone())),
            DAppNetwork::Custom(custom) => Ok(custom.rpc.clone()),
        }
    }
}
