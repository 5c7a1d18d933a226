//! Per-origin permission sessions.

mod store;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::network::DAppNetwork;

pub use store::{DAppSessions, SESSIONS_KEY, SessionStore};

/// Display metadata a requester supplies about itself. Opaque to the
/// protocol beyond `name`, which keys the reconnect fast path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppMeta {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AppMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// A granted permission binding an origin to one account on one network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DAppSession {
    pub network: DAppNetwork,
    pub app_meta: AppMeta,
    pub pkh: String,
    pub public_key: String,
}
