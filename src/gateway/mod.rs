//! HTTP/WebSocket gateway.
//!
//! Requesters reach the arbiters through `POST /api/dapp`. Approval surfaces
//! talk to the confirmation orchestrator over `GET /api/intercom`, one
//! WebSocket per port. Session administration sits behind the bearer token.

pub mod auth;
pub mod server;
pub mod types;
pub mod ws;

pub use server::{GatewayState, start_server};
pub use ws::PortTracker;

/// Random 32-byte hex token for when none is configured.
pub fn generate_auth_token() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
