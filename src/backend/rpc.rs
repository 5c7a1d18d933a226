use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ForgeError, RpcError};
use crate::micheline::decode_hex;

use super::{ChainRpc, OperationParser, ParsedOperation};

/// Base58check prefix of block hashes (`B...`).
const BLOCK_HASH_PREFIX: [u8; 2] = [1, 52];
const BRANCH_LEN: usize = 32;

/// Tezos node RPC over HTTP.
#[derive(Debug, Clone)]
pub struct TezosRpcClient {
    client: Client,
}

impl Default for TezosRpcClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl TezosRpcClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: String,
        body: Option<Value>,
    ) -> Result<T, RpcError> {
        let request = match &body {
            Some(body) => self.client.post(&url).json(body),
            None => self.client.get(&url),
        };
        let response = request.send().await.map_err(|e| RpcError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| RpcError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            if let Some(ids) = node_error_ids(&text) {
                return Err(RpcError::Operation(ids));
            }
            return Err(RpcError::Request {
                url,
                reason: format!("HTTP {status}: {text}"),
            });
        }

        serde_json::from_str(&text).map_err(|e| RpcError::InvalidResponse {
            url,
            reason: e.to_string(),
        })
    }
}

fn endpoint(rpc: &str, path: &str) -> String {
    format!("{}{}", rpc.trim_end_matches('/'), path)
}

/// Node errors come back as a JSON array of `{kind, id, ...}` objects.
fn node_error_ids(body: &str) -> Option<String> {
    let errors: Vec<Value> = serde_json::from_str(body).ok()?;
    let ids: Vec<&str> = errors
        .iter()
        .filter_map(|e| e.get("id").and_then(Value::as_str))
        .collect();
    (!ids.is_empty()).then(|| ids.join(", "))
}

fn encode_block_hash(bytes: &[u8]) -> String {
    let mut data = BLOCK_HASH_PREFIX.to_vec();
    data.extend_from_slice(bytes);
    let checksum = Sha256::digest(Sha256::digest(&data));
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

#[async_trait]
impl ChainRpc for TezosRpcClient {
    async fn chain_id(&self, rpc: &str) -> Result<String, RpcError> {
        self.send(endpoint(rpc, "/chains/main/chain_id"), None).await
    }

    async fn inject_operation(&self, rpc: &str, signed_bytes: &str) -> Result<String, RpcError> {
        let hash: String = self
            .send(endpoint(rpc, "/injection/operation"), Some(json!(signed_bytes)))
            .await?;
        debug!(hash = %hash, "Operation injected");
        Ok(hash)
    }
}

#[async_trait]
impl OperationParser for TezosRpcClient {
    async fn parse_operation(
        &self,
        rpc: &str,
        bytes: &str,
    ) -> Result<ParsedOperation, ForgeError> {
        let raw = decode_hex(bytes)?;
        if raw.len() <= BRANCH_LEN {
            return Err(ForgeError::UnexpectedEnd(raw.len()));
        }
        let branch = encode_block_hash(&raw[..BRANCH_LEN]);
        let data = &bytes[BRANCH_LEN * 2..];

        let parsed: Vec<ParsedOperation> = self
            .send(
                endpoint(rpc, "/chains/main/blocks/head/helpers/parse/operations"),
                Some(json!({
                    "operations": [{ "branch": branch, "data": data }],
                    "check_signature": false,
                })),
            )
            .await?;
        parsed
            .into_iter()
            .next()
            .ok_or_else(|| ForgeError::Invalid("node returned no operations".to_string()))
    }
}
