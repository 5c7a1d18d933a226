use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::VaultError;

use super::{SentOperation, Vault};

/// Remote vault speaking the signer protocol (`POST /keys/{pkh}`) plus an
/// operation submission endpoint (`POST /operations/{pkh}`).
pub struct HttpVault {
    base_url: String,
    token: Option<SecretString>,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct VaultFailure {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    message: String,
}

impl HttpVault {
    pub fn new(base_url: impl Into<String>, token: Option<SecretString>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn post(&self, path: &str, body: &Value) -> RequestBuilder {
        let request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        pkh: &str,
        path: &str,
        body: Value,
    ) -> Result<T, VaultError> {
        let response = self
            .post(path, &body)
            .send()
            .await
            .map_err(|e| VaultError::Unavailable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| VaultError::Unavailable(e.to_string()))?;
        if status.is_success() {
            return serde_json::from_str(&text)
                .map_err(|e| VaultError::Failed(format!("invalid vault response: {e}")));
        }
        Err(map_failure(status, pkh, &text))
    }
}

fn map_failure(status: StatusCode, pkh: &str, body: &str) -> VaultError {
    let failure: Option<VaultFailure> = serde_json::from_str(body).ok();
    match (status, failure) {
        (StatusCode::LOCKED, _) => VaultError::Locked,
        (StatusCode::NOT_FOUND, _) => VaultError::UnknownAccount(pkh.to_string()),
        (_, Some(f)) if f.kind == "tezos_operation" => VaultError::TezosOperation(f.message),
        (StatusCode::SERVICE_UNAVAILABLE, _) => VaultError::Unavailable(body.to_string()),
        (status, _) => VaultError::Failed(format!("HTTP {status}: {body}")),
    }
}

#[async_trait]
impl Vault for HttpVault {
    async fn send_operations(
        &self,
        pkh: &str,
        rpc: &str,
        op_params: &[Value],
    ) -> Result<SentOperation, VaultError> {
        let sent: SentOperation = self
            .call(
                pkh,
                &format!("/operations/{pkh}"),
                json!({ "rpc": rpc, "operations": op_params }),
            )
            .await?;
        debug!(pkh, hash = %sent.hash, "Vault submitted operations");
        Ok(sent)
    }

    async fn sign(&self, pkh: &str, bytes: &str) -> Result<String, VaultError> {
        let signed: SignResponse = self
            .call(pkh, &format!("/keys/{pkh}"), json!(bytes))
            .await?;
        Ok(signed.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_vault_failures() {
        assert!(matches!(
            map_failure(StatusCode::LOCKED, "tz1a", ""),
            VaultError::Locked
        ));
        assert!(matches!(
            map_failure(StatusCode::NOT_FOUND, "tz1a", ""),
            VaultError::UnknownAccount(pkh) if pkh == "tz1a"
        ));
        assert!(matches!(
            map_failure(
                StatusCode::UNPROCESSABLE_ENTITY,
                "tz1a",
                r#"{"kind":"tezos_operation","message":"balance_too_low"}"#
            ),
            VaultError::TezosOperation(msg) if msg == "balance_too_low"
        ));
        assert!(matches!(
            map_failure(StatusCode::INTERNAL_SERVER_ERROR, "tz1a", "boom"),
            VaultError::Failed(_)
        ));
    }

    #[test]
    fn trims_trailing_slash() {
        let vault = HttpVault::new("http://127.0.0.1:6732/", None, Duration::from_secs(1));
        assert_eq!(vault.base_url, "http://127.0.0.1:6732");
    }
}
