//! Bearer-token auth for administration routes and the intercom socket.
//!
//! Browsers can't set headers on WebSocket upgrades, so the token is also
//! accepted as a `token` query parameter.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct AuthState {
    pub token: String,
}

pub async fn auth_middleware(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = bearer_token(request.headers())
        .or_else(|| query_token(request.uri().query()));

    match presented {
        Some(token) if tokens_match(&token, &auth.token) => Ok(next.run(request).await),
        Some(_) => {
            tracing::debug!(path = %request.uri().path(), "Rejected invalid gateway token");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
}

fn query_token(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
}

fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
