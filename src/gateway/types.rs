//! Wire types of the gateway that are not protocol messages themselves.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::intercom::IntercomResponse;
use crate::session::DAppSessions;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub pending_confirmations: usize,
    pub connected_ports: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: DAppSessions,
}

/// Inbound intercom frame. `payload` is kept raw so a malformed payload can
/// still be answered under its `reqId`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntercomFrameIn {
    pub req_id: u64,
    pub payload: Value,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntercomFrameOut {
    pub req_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<IntercomResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntercomFrameOut {
    pub fn reply(req_id: u64, payload: IntercomResponse) -> Self {
        Self {
            req_id,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn error(req_id: u64, message: impl Into<String>) -> Self {
        Self {
            req_id,
            payload: None,
            error: Some(message.into()),
        }
    }
}
