//! Intercom WebSocket: one socket per approval-surface port.
//!
//! Handshakes are answered in arrival order. Decisions run on their own
//! tasks so a surface can still talk to the gateway while an approved
//! action is running. Replies funnel through one writer task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::confirm::{ConfirmationOrchestrator, PortId};
use crate::gateway::types::{IntercomFrameIn, IntercomFrameOut};
use crate::intercom::IntercomRequest;

/// Counts live intercom ports.
#[derive(Debug, Default)]
pub struct PortTracker {
    connected: AtomicU64,
}

impl PortTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected(&self) -> u64 {
        self.connected.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.connected.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement(&self) {
        self.connected.fetch_sub(1, Ordering::Relaxed);
    }
}

pub async fn handle_intercom_socket(
    socket: WebSocket,
    orchestrator: ConfirmationOrchestrator,
    tracker: Arc<PortTracker>,
) {
    let port = PortId::new();
    tracker.increment();
    info!(%port, "Intercom port connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<IntercomFrameOut>(32);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Failed to serialize intercom frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let frame = match serde_json::from_str::<IntercomFrameIn>(text.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(%port, "Dropping malformed intercom frame: {}", e);
                continue;
            }
        };

        let req_id = frame.req_id;
        let request = match serde_json::from_value::<IntercomRequest>(frame.payload) {
            Ok(request) => request,
            Err(e) => {
                let _ = tx
                    .send(IntercomFrameOut::error(
                        req_id,
                        format!("invalid intercom payload: {e}"),
                    ))
                    .await;
                continue;
            }
        };

        debug!(%port, req_id, id = %request.id(), "Intercom request");

        // Handshakes are answered in order so a decision sent right after
        // one always finds its port bound.
        if matches!(request, IntercomRequest::GetPayload { .. }) {
            if let Some(out) = route(&orchestrator, port, req_id, request).await {
                let _ = tx.send(out).await;
            }
            continue;
        }

        let orchestrator = orchestrator.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(out) = route(&orchestrator, port, req_id, request).await {
                let _ = tx.send(out).await;
            }
        });
    }

    orchestrator.port_disconnected(port).await;
    tracker.decrement();
    drop(tx);
    writer.abort();
    info!(%port, "Intercom port disconnected");
}

async fn route(
    orchestrator: &ConfirmationOrchestrator,
    port: PortId,
    req_id: u64,
    request: IntercomRequest,
) -> Option<IntercomFrameOut> {
    match orchestrator.handle_intercom(port, request).await? {
        Ok(response) => Some(IntercomFrameOut::reply(req_id, response)),
        Err(message) => Some(IntercomFrameOut::error(req_id, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_counts_up_and_down() {
        let tracker = PortTracker::new();
        tracker.increment();
        tracker.increment();
        tracker.decrement();
        assert_eq!(tracker.connected(), 1);
    }
}
