//! Confirmation lifecycle.
//!
//! ```text
//! open ──► AwaitingHandshake ──(payload fetched, port bound)──► AwaitingDecision
//!                                                                │        │
//!                                                        confirmed=false  confirmed=true
//!                                                                │        ▼
//!                                                                │     Deciding ──(action done)──┐
//!                                                                ▼                               ▼
//!                                                             declined ◄── timeout / closed    resolved
//! ```
//!
//! Removal from the pending map is the only way a confirmation ends, so
//! whichever path removes it first is the one that resolves it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SurfaceError;
use crate::intercom::{IntercomRequest, IntercomResponse};

use super::surface::{SurfaceGeometry, SurfaceHandle, SurfaceHost};
use super::{ConfirmationId, ConfirmationPayload, PortId};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Base URL the approval surface page is served from.
    pub surface_base_url: String,
    pub timeout: Duration,
    pub geometry: SurfaceGeometry,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            surface_base_url: "http://127.0.0.1:7474".to_string(),
            timeout: Duration::from_secs(120),
            geometry: SurfaceGeometry::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    /// The user answered `confirmed: false`.
    Rejected,
    TimedOut,
    SurfaceClosed,
    /// The waiting request went away.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedAccount {
    pub pkh: String,
    pub public_key: String,
}

/// A positive decision. The outcome of the approved action must be reported
/// back through [`Approval::respond`] so the surface learns how it went.
pub struct Approval {
    account: Option<ApprovedAccount>,
    reply: oneshot::Sender<Result<(), String>>,
}

impl Approval {
    /// Account chosen on a connect surface.
    pub fn take_account(&mut self) -> Option<ApprovedAccount> {
        self.account.take()
    }

    pub fn respond(self, outcome: Result<(), String>) {
        // The surface may already be gone.
        let _ = self.reply.send(outcome);
    }
}

impl std::fmt::Debug for Approval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Approval")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum Decision {
    Approved(Approval),
    Declined(DeclineReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingHandshake,
    AwaitingDecision,
    Deciding,
}

struct PendingConfirmation {
    payload: ConfirmationPayload,
    state: State,
    port: Option<PortId>,
    surface: Option<SurfaceHandle>,
    decision: Option<oneshot::Sender<Decision>>,
    timer: Option<JoinHandle<()>>,
    surface_gone: bool,
}

/// A confirmation removed from the map, awaiting its side effects.
struct Detached {
    id: ConfirmationId,
    cause: Option<DeclineReason>,
    decision: Option<oneshot::Sender<Decision>>,
    surface: Option<SurfaceHandle>,
}

type PendingMap = HashMap<ConfirmationId, PendingConfirmation>;

struct Inner {
    host: Arc<dyn SurfaceHost>,
    settings: OrchestratorSettings,
    pending: Mutex<PendingMap>,
}

impl Inner {
    /// Remove `id` for `cause` (`None` = the approved action completed).
    ///
    /// A confirmation being decided ignores its timer and only notes that
    /// the surface went away; the action in flight finishes it.
    fn detach(
        pending: &mut PendingMap,
        id: ConfirmationId,
        cause: Option<DeclineReason>,
    ) -> Option<Detached> {
        let entry = pending.get_mut(&id)?;
        if entry.state == State::Deciding {
            match cause {
                Some(DeclineReason::TimedOut) => return None,
                Some(DeclineReason::SurfaceClosed) => {
                    entry.surface_gone = true;
                    return None;
                }
                _ => {}
            }
        }

        let entry = pending.remove(&id)?;
        if let Some(timer) = entry.timer {
            // The timer tears down from inside its own task.
            if cause != Some(DeclineReason::TimedOut) {
                timer.abort();
            }
        }
        let surface_gone = entry.surface_gone || cause == Some(DeclineReason::SurfaceClosed);
        Some(Detached {
            id,
            cause,
            decision: entry.decision,
            surface: if surface_gone { None } else { entry.surface },
        })
    }

    async fn complete(&self, detached: Detached) {
        let Detached {
            id,
            cause,
            decision,
            surface,
        } = detached;
        if let Some(handle) = surface {
            self.close_surface(&handle).await;
        }
        match cause {
            Some(reason) => {
                if let Some(tx) = decision {
                    let _ = tx.send(Decision::Declined(reason));
                }
                info!(%id, ?reason, "Confirmation declined");
            }
            None => info!(%id, "Confirmation resolved"),
        }
    }

    async fn teardown(&self, id: ConfirmationId, cause: Option<DeclineReason>) {
        let detached = Self::detach(&mut *self.pending.lock().await, id, cause);
        if let Some(detached) = detached {
            self.complete(detached).await;
        }
    }

    async fn close_surface(&self, handle: &SurfaceHandle) {
        if let Err(e) = self.host.close(handle).await {
            warn!(surface = %handle, "Failed to close approval surface: {}", e);
        }
    }
}

fn spawn_timer(inner: Weak<Inner>, id: ConfirmationId, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Some(inner) = inner.upgrade() {
            debug!(%id, "Confirmation timed out");
            inner.teardown(id, Some(DeclineReason::TimedOut)).await;
        }
    })
}

/// Drives approval surfaces for all pending confirmations.
#[derive(Clone)]
pub struct ConfirmationOrchestrator {
    inner: Arc<Inner>,
}

impl ConfirmationOrchestrator {
    pub fn new(host: Arc<dyn SurfaceHost>, settings: OrchestratorSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                host,
                settings,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    /// Open a surface for `payload` and register it under a fresh id.
    pub async fn open(
        &self,
        payload: ConfirmationPayload,
    ) -> Result<ConfirmationTicket, SurfaceError> {
        let id = ConfirmationId::new();
        let kind = payload.kind();
        let origin = payload.origin().to_string();
        let (decision_tx, decision_rx) = oneshot::channel();

        // Registered before the surface exists so an early handshake finds it.
        self.inner.pending.lock().await.insert(
            id,
            PendingConfirmation {
                payload,
                state: State::AwaitingHandshake,
                port: None,
                surface: None,
                decision: Some(decision_tx),
                timer: None,
                surface_gone: false,
            },
        );

        let settings = &self.inner.settings;
        let url = format!(
            "{}/confirm?id={}",
            settings.surface_base_url.trim_end_matches('/'),
            id
        );
        let focused = self.inner.host.focused_bounds().await;
        let spec = settings
            .geometry
            .place(url, focused, self.inner.host.window_chrome());

        let handle = match self.inner.host.open(spec).await {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.pending.lock().await.remove(&id);
                warn!(%id, kind, origin, "Failed to open approval surface: {}", e);
                return Err(e);
            }
        };

        let mut pending = self.inner.pending.lock().await;
        match pending.get_mut(&id) {
            Some(entry) => {
                entry.surface = Some(handle);
                entry.timer = Some(spawn_timer(
                    Arc::downgrade(&self.inner),
                    id,
                    settings.timeout,
                ));
                drop(pending);
                info!(%id, kind, origin, "Confirmation opened");
            }
            None => {
                // Decided while the surface was still opening.
                drop(pending);
                self.inner.close_surface(&handle).await;
            }
        }

        Ok(ConfirmationTicket {
            id,
            decision: Some(decision_rx),
            inner: Arc::clone(&self.inner),
            finished: false,
        })
    }

    /// Route an intercom message from `port`.
    ///
    /// `None` means the message was not for this port or not expected now
    /// and gets no answer.
    pub async fn handle_intercom(
        &self,
        port: PortId,
        request: IntercomRequest,
    ) -> Option<Result<IntercomResponse, String>> {
        match request {
            IntercomRequest::GetPayload { id } => self.handshake(port, id).await.map(Ok),
            IntercomRequest::PermConfirmation {
                id,
                confirmed,
                account_public_key_hash,
                account_public_key,
            } => {
                let account = match (account_public_key_hash, account_public_key) {
                    (Some(pkh), Some(public_key)) => Some(ApprovedAccount { pkh, public_key }),
                    _ => None,
                };
                if confirmed && account.is_none() {
                    debug!(%id, "Connect approved without an account, declining");
                }
                let confirmed = confirmed && account.is_some();
                self.decide(
                    port,
                    id,
                    "connect",
                    confirmed,
                    account,
                    IntercomResponse::PermConfirmation,
                )
                .await
            }
            IntercomRequest::OpsConfirmation { id, confirmed } => {
                self.decide(
                    port,
                    id,
                    "confirm_operations",
                    confirmed,
                    None,
                    IntercomResponse::OpsConfirmation,
                )
                .await
            }
            IntercomRequest::SignConfirmation { id, confirmed } => {
                self.decide(
                    port,
                    id,
                    "sign",
                    confirmed,
                    None,
                    IntercomResponse::SignConfirmation,
                )
                .await
            }
        }
    }

    async fn handshake(&self, port: PortId, id: ConfirmationId) -> Option<IntercomResponse> {
        let mut pending = self.inner.pending.lock().await;
        let Some(entry) = pending.get_mut(&id) else {
            debug!(%id, %port, "Payload requested for unknown confirmation");
            return None;
        };
        match entry.port {
            None => {
                entry.port = Some(port);
                entry.state = State::AwaitingDecision;
                debug!(%id, %port, "Approval surface bound");
            }
            Some(bound) if bound == port => {}
            Some(_) => {
                debug!(%id, %port, "Payload request from unbound port ignored");
                return None;
            }
        }
        Some(IntercomResponse::GetPayload {
            payload: entry.payload.clone(),
        })
    }

    async fn decide(
        &self,
        port: PortId,
        id: ConfirmationId,
        kind: &'static str,
        confirmed: bool,
        account: Option<ApprovedAccount>,
        response: IntercomResponse,
    ) -> Option<Result<IntercomResponse, String>> {
        let mut pending = self.inner.pending.lock().await;
        let Some(entry) = pending.get_mut(&id) else {
            debug!(%id, %port, "Decision for unknown confirmation");
            return None;
        };
        if entry.port != Some(port)
            || entry.state != State::AwaitingDecision
            || entry.payload.kind() != kind
        {
            debug!(%id, %port, kind, "Unexpected decision ignored");
            return None;
        }

        if !confirmed {
            let detached = Inner::detach(&mut pending, id, Some(DeclineReason::Rejected));
            drop(pending);
            if let Some(detached) = detached {
                self.inner.complete(detached).await;
            }
            return Some(Ok(response));
        }

        entry.state = State::Deciding;
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let approval = Approval {
            account,
            reply: reply_tx,
        };
        let delivered = entry
            .decision
            .take()
            .is_some_and(|tx| tx.send(Decision::Approved(approval)).is_ok());
        if !delivered {
            let detached = Inner::detach(&mut pending, id, Some(DeclineReason::Abandoned));
            drop(pending);
            if let Some(detached) = detached {
                self.inner.complete(detached).await;
            }
            return Some(Err("Request is no longer pending".to_string()));
        }
        drop(pending);
        info!(%id, kind, "Confirmation approved");

        match reply_rx.await {
            Ok(Ok(())) => Some(Ok(response)),
            Ok(Err(message)) => Some(Err(message)),
            Err(_) => Some(Err("Request is no longer pending".to_string())),
        }
    }

    /// The host reports that a surface was dismissed.
    pub async fn surface_closed(&self, handle: &SurfaceHandle) {
        let detached = {
            let mut pending = self.inner.pending.lock().await;
            let id = pending
                .iter()
                .find(|(_, entry)| entry.surface.as_ref() == Some(handle))
                .map(|(id, _)| *id);
            id.and_then(|id| Inner::detach(&mut pending, id, Some(DeclineReason::SurfaceClosed)))
        };
        if let Some(detached) = detached {
            self.inner.complete(detached).await;
        }
    }

    /// An intercom port went away. Confirmations bound to it count as closed.
    pub async fn port_disconnected(&self, port: PortId) {
        let detached: Vec<Detached> = {
            let mut pending = self.inner.pending.lock().await;
            let ids: Vec<ConfirmationId> = pending
                .iter()
                .filter(|(_, entry)| entry.port == Some(port))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    Inner::detach(&mut pending, id, Some(DeclineReason::SurfaceClosed))
                })
                .collect()
        };
        for d in detached {
            self.inner.complete(d).await;
        }
    }
}

/// Handle the requesting side holds while a confirmation is pending.
///
/// Dropping it without [`finish`](Self::finish) tears the confirmation down
/// as abandoned.
pub struct ConfirmationTicket {
    id: ConfirmationId,
    decision: Option<oneshot::Receiver<Decision>>,
    inner: Arc<Inner>,
    finished: bool,
}

impl ConfirmationTicket {
    pub fn id(&self) -> ConfirmationId {
        self.id
    }

    /// Wait for the decision. Resolves exactly once; later calls report
    /// the request as abandoned.
    pub async fn decision(&mut self) -> Decision {
        match self.decision.take() {
            Some(rx) => rx
                .await
                .unwrap_or(Decision::Declined(DeclineReason::Abandoned)),
            None => Decision::Declined(DeclineReason::Abandoned),
        }
    }

    /// Tear down after the approved action has been reported.
    pub async fn finish(mut self) {
        self.finished = true;
        self.inner.teardown(self.id, None).await;
    }
}

impl Drop for ConfirmationTicket {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let id = self.id;
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                inner.teardown(id, Some(DeclineReason::Abandoned)).await;
            });
        }
    }
}
