//! Axum HTTP server for the gateway.
//!
//! Handles the requester endpoint, the intercom socket, session
//! administration and health.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State, WebSocketUpgrade},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use tokio::sync::{RwLock, oneshot};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::arbiter::{DAppArbiter, DAppRequest};
use crate::error::{DAppError, GatewayError};
use crate::gateway::auth::{AuthState, auth_middleware};
use crate::gateway::types::{HealthResponse, SessionsResponse};
use crate::gateway::ws::{PortTracker, handle_intercom_socket};

/// Shared state for all gateway handlers.
pub struct GatewayState {
    pub arbiter: Arc<DAppArbiter>,
    /// Origins allowed to call `/api/dapp` from a browser. Empty allows any.
    pub allowed_origins: Vec<String>,
    pub ports: Arc<PortTracker>,
    /// Shutdown signal sender.
    pub shutdown_tx: RwLock<Option<oneshot::Sender<()>>>,
}

impl GatewayState {
    pub fn new(arbiter: Arc<DAppArbiter>, allowed_origins: Vec<String>) -> Self {
        Self {
            arbiter,
            allowed_origins,
            ports: Arc::new(PortTracker::new()),
            shutdown_tx: RwLock::new(None),
        }
    }

    /// Ask a running server to stop. No-op if it was never started.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
    }
}

/// Start the gateway HTTP server.
///
/// Returns the actual bound `SocketAddr` (useful when binding to port 0).
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<GatewayState>,
    auth_token: String,
) -> Result<SocketAddr, GatewayError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::StartupFailed {
            reason: format!("Failed to bind to {}: {}", addr, e),
        })?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| GatewayError::StartupFailed {
            reason: format!("Failed to get local addr: {}", e),
        })?;

    let auth_state = AuthState { token: auth_token };

    // Any page may ask for a connection; the human decides. Browsers need
    // CORS for that, restricted to the configured list when there is one.
    let requester = Router::new()
        .route("/api/dapp", post(dapp_handler))
        .layer(requester_cors(&state.allowed_origins));

    let public = Router::new().route("/api/health", get(health_handler));

    let protected = Router::new()
        .route("/api/intercom", get(intercom_ws_handler))
        .route(
            "/api/sessions",
            get(sessions_list_handler).delete(sessions_clear_handler),
        )
        .route("/api/sessions/{origin}", delete(sessions_remove_handler))
        .route_layer(middleware::from_fn_with_state(auth_state, auth_middleware));

    let app = Router::new()
        .merge(public)
        .merge(requester)
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(1024 * 1024)),
        )
        .with_state(state.clone());

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    *state.shutdown_tx.write().await = Some(shutdown_tx);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Gateway shutting down");
            })
            .await
        {
            tracing::error!("Gateway server error: {}", e);
        }
    });

    info!("Gateway listening on {}", bound_addr);
    Ok(bound_addr)
}

fn requester_cors(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring unparseable allowed origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

// --- Health ---

async fn health_handler(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "tezgate",
        pending_confirmations: state.arbiter.orchestrator().pending_count().await,
        connected_ports: state.ports.connected(),
    })
}

// --- Requester ---

/// HTTP status a requester failure is reported with.
pub fn status_for(err: &DAppError) -> StatusCode {
    match err {
        DAppError::InvalidParams(_) => StatusCode::BAD_REQUEST,
        DAppError::NotGranted => StatusCode::FORBIDDEN,
        DAppError::NotFound => StatusCode::NOT_FOUND,
        DAppError::TezosOperation => StatusCode::UNPROCESSABLE_ENTITY,
        DAppError::BroadcastFailed => StatusCode::BAD_GATEWAY,
        DAppError::UnknownNetwork(_)
        | DAppError::Storage(_)
        | DAppError::Vault(_)
        | DAppError::Surface(_)
        | DAppError::ActionAborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn dapp_error_response(err: &DAppError) -> Response {
    (status_for(err), Json(err.to_payload())).into_response()
}

async fn dapp_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let origin = match headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|o| !o.is_empty() && *o != "null")
    {
        Some(origin) => origin.to_string(),
        None => return dapp_error_response(&DAppError::InvalidParams("origin")),
    };

    let request: DAppRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(origin, "Unparseable requester message: {}", e);
            return dapp_error_response(&DAppError::InvalidParams("request"));
        }
    };

    match state.arbiter.handle_request(&origin, request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            if status_for(&err).is_server_error() {
                warn!(origin, error = %err, "Requester message failed");
            } else {
                debug!(origin, code = err.code(), "Requester message refused");
            }
            dapp_error_response(&err)
        }
    }
}

// --- Intercom ---

async fn intercom_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    let orchestrator = state.arbiter.orchestrator().clone();
    let ports = Arc::clone(&state.ports);
    ws.on_upgrade(move |socket| handle_intercom_socket(socket, orchestrator, ports))
}

// --- Sessions ---

async fn sessions_list_handler(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<SessionsResponse>, (StatusCode, String)> {
    let sessions = state
        .arbiter
        .sessions()
        .get_all()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(SessionsResponse { sessions }))
}

async fn sessions_remove_handler(
    State(state): State<Arc<GatewayState>>,
    Path(origin): Path<String>,
) -> Result<Json<SessionsResponse>, (StatusCode, String)> {
    let store = state.arbiter.sessions();
    let exists = store
        .get(&origin)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .is_some();
    if !exists {
        return Err((StatusCode::NOT_FOUND, format!("No session for {origin}")));
    }
    let sessions = store
        .remove(&origin)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(SessionsResponse { sessions }))
}

async fn sessions_clear_handler(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<SessionsResponse>, (StatusCode, String)> {
    state
        .arbiter
        .sessions()
        .clear()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(SessionsResponse {
        sessions: Default::default(),
    }))
}
