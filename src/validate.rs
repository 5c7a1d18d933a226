//! Request validation and normalization.
//!
//! Every check here runs before any storage access or confirmation, so a
//! malformed request fails fast without side effects.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::DAppError;
use crate::network::{DAppNetwork, NetworkRegistry};
use crate::session::AppMeta;

/// Base58check prefixes of 20-byte Tezos address hashes.
const ADDRESS_PREFIXES: [&[u8]; 5] = [
    &[6, 161, 159], // tz1
    &[6, 161, 161], // tz2
    &[6, 161, 164], // tz3
    &[6, 161, 166], // tz4
    &[2, 90, 121],  // KT1
];
const ADDRESS_HASH_LEN: usize = 20;

/// Whether `value` is a well-formed, checksummed Tezos address.
pub fn is_address_valid(value: &str) -> bool {
    let Some(decoded) = decode_base58check(value) else {
        return false;
    };
    ADDRESS_PREFIXES.iter().any(|prefix| {
        decoded.len() == prefix.len() + ADDRESS_HASH_LEN && decoded.starts_with(prefix)
    })
}

fn decode_base58check(value: &str) -> Option<Vec<u8>> {
    let raw = bs58::decode(value).into_vec().ok()?;
    if raw.len() < 4 {
        return None;
    }
    let (data, checksum) = raw.split_at(raw.len() - 4);
    let digest = Sha256::digest(Sha256::digest(data));
    (digest[..4] == *checksum).then(|| data.to_vec())
}

/// Strict hexadecimal: non-empty, hex digits only.
pub fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Drop an optional `0x` prefix from a sign payload.
pub fn normalize_payload(payload: &str) -> &str {
    payload.strip_prefix("0x").unwrap_or(payload)
}

/// Network must be a known enabled id or an inline descriptor with an RPC.
pub fn permission_network(
    raw: &Value,
    networks: &NetworkRegistry,
) -> Result<DAppNetwork, DAppError> {
    let network: DAppNetwork = serde_json::from_value(raw.clone())
        .map_err(|_| DAppError::InvalidParams("network"))?;
    if !networks.is_allowed(&network) {
        return Err(DAppError::InvalidParams("network"));
    }
    Ok(network)
}

/// `appMeta` must be an object whose `name` is a string.
pub fn app_meta(raw: &Value) -> Result<AppMeta, DAppError> {
    if !raw.get("name").is_some_and(Value::is_string) {
        return Err(DAppError::InvalidParams("appMeta.name"));
    }
    serde_json::from_value(raw.clone()).map_err(|_| DAppError::InvalidParams("appMeta"))
}

pub fn source_pkh(value: &str) -> Result<(), DAppError> {
    if is_address_valid(value) {
        Ok(())
    } else {
        Err(DAppError::InvalidParams("sourcePkh"))
    }
}

/// Non-empty list where every element carries a string `kind`.
pub fn op_params(params: &[Value]) -> Result<(), DAppError> {
    if params.is_empty() {
        return Err(DAppError::InvalidParams("opParams"));
    }
    if !params
        .iter()
        .all(|op| op.get("kind").is_some_and(Value::is_string))
    {
        return Err(DAppError::InvalidParams("opParams.kind"));
    }
    Ok(())
}

/// Normalize and check a sign payload, returning the bare hex.
pub fn sign_payload(payload: &str) -> Result<String, DAppError> {
    let normalized = normalize_payload(payload);
    if !is_hex(normalized) {
        return Err(DAppError::InvalidParams("payload"));
    }
    Ok(normalized.to_string())
}

pub fn signed_op_bytes(bytes: &str) -> Result<(), DAppError> {
    if bytes.is_empty() {
        return Err(DAppError::InvalidParams("signedOpBytes"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALICE: &str = "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb";
    const BOOTSTRAP1: &str = "tz1KqTpEZ7Yob7QbPE4Hy4Wo8fHG8LhKxZSx";

    #[test]
    fn accepts_checksummed_addresses() {
        assert!(is_address_valid(ALICE));
        assert!(is_address_valid(BOOTSTRAP1));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_address_valid(""));
        assert!(!is_address_valid("tz1"));
        assert!(!is_address_valid("0x9431Cf5DA0CE60664661341db650763B08286B18"));
        // Last character flipped breaks the checksum.
        assert!(!is_address_valid("tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjc"));
        // Base58 excludes '0', 'O', 'I' and 'l'.
        assert!(!is_address_valid("tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcj0"));
    }

    #[test]
    fn hex_and_payload_normalization() {
        assert!(is_hex("0501000000084d657373616765"));
        assert!(is_hex("ABCdef"));
        assert!(!is_hex(""));
        assert!(!is_hex("0xab"));
        assert!(!is_hex("zz"));

        assert_eq!(sign_payload("0x05010000").unwrap(), "05010000");
        assert_eq!(sign_payload("05010000").unwrap(), "05010000");
        assert!(sign_payload("0x").is_err());
        assert!(sign_payload("hello").is_err());
    }

    #[test]
    fn op_params_require_string_kinds() {
        assert!(op_params(&[]).is_err());
        assert!(op_params(&[json!({"kind": "transaction", "to": ALICE})]).is_ok());
        assert!(op_params(&[json!({"kind": "transaction"}), json!({"amount": 1})]).is_err());
        assert!(op_params(&[json!({"kind": 7})]).is_err());
    }

    #[test]
    fn permission_inputs() {
        let networks = NetworkRegistry::default();
        assert!(permission_network(&json!("mainnet"), &networks).is_ok());
        assert!(permission_network(&json!({"rpc": "https://rpc.example"}), &networks).is_ok());
        assert!(permission_network(&json!("jakartanet"), &networks).is_err());
        assert!(permission_network(&json!({"rpc": ""}), &networks).is_err());
        assert!(permission_network(&json!(42), &networks).is_err());

        let meta = app_meta(&json!({"name": "Quipu", "icon": "q.png"})).unwrap();
        assert_eq!(meta.name, "Quipu");
        assert_eq!(meta.extra["icon"], "q.png");
        assert!(app_meta(&json!({"name": 1})).is_err());
        assert!(app_meta(&Value::Null).is_err());
    }
}
