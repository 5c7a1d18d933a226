//! Packed Micheline strings for sign previews.
//!
//! Signed-message payloads are always a packed string (`05` watermark,
//! `01` string tag, 4-byte length, UTF-8 text), so that is the only node
//! this module decodes.

use crate::error::ForgeError;

/// Watermark byte of packed Micheline data.
pub const PACKED_WATERMARK: u8 = 0x05;

const STRING_TAG: u8 = 0x01;

pub fn decode_hex(value: &str) -> Result<Vec<u8>, ForgeError> {
    if !value.len().is_multiple_of(2) {
        return Err(ForgeError::Invalid(
            "hex string must have an even number of characters".to_string(),
        ));
    }
    value
        .as_bytes()
        .chunks_exact(2)
        .map(|pair| match (hex_nibble(pair[0]), hex_nibble(pair[1])) {
            (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
            _ => Err(ForgeError::Invalid("invalid hex character".to_string())),
        })
        .collect()
}

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decode a packed string. Any other node or trailing bytes are an error.
pub fn unpack_string(hex: &str) -> Result<String, ForgeError> {
    let bytes = decode_hex(hex)?;
    let header = |offset: usize, expected: u8| match bytes.get(offset) {
        Some(&tag) if tag == expected => Ok(()),
        Some(&tag) => Err(ForgeError::UnknownTag { tag, offset }),
        None => Err(ForgeError::UnexpectedEnd(offset)),
    };
    header(0, PACKED_WATERMARK)?;
    header(1, STRING_TAG)?;

    let raw_len = bytes.get(2..6).ok_or(ForgeError::UnexpectedEnd(bytes.len()))?;
    let len = u32::from_be_bytes([raw_len[0], raw_len[1], raw_len[2], raw_len[3]]) as usize;
    let body = &bytes[6..];
    if body.len() < len {
        return Err(ForgeError::UnexpectedEnd(bytes.len()));
    }
    if body.len() > len {
        return Err(ForgeError::Invalid(format!(
            "{} trailing bytes",
            body.len() - len
        )));
    }
    String::from_utf8(body.to_vec()).map_err(|e| ForgeError::Invalid(e.to_string()))
}

/// Unpack a packed string and render it for display: Michelson string
/// syntax with the outer quotes trimmed.
pub fn render_packed(hex: &str) -> Result<String, ForgeError> {
    let text = unpack_string(hex)?;
    // JSON string escaping matches Michelson's for printable text.
    let quoted = serde_json::Value::String(text).to_string();
    Ok(strip_quotes(&quoted).to_string())
}

fn strip_quotes(rendered: &str) -> &str {
    rendered
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_of(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn packed_string(text: &str) -> String {
        let mut bytes = vec![0x05, 0x01];
        bytes.extend_from_slice(&(text.len() as u32).to_be_bytes());
        bytes.extend_from_slice(text.as_bytes());
        hex_of(&bytes)
    }

    #[test]
    fn renders_signed_message_strings() {
        let hex = packed_string("Tezos Signed Message: hello.example 2026-01-01 Sign in");
        assert!(hex.starts_with("0501"));
        assert_eq!(
            render_packed(&hex).unwrap(),
            "Tezos Signed Message: hello.example 2026-01-01 Sign in"
        );
    }

    #[test]
    fn escapes_quotes_inside_the_message() {
        let hex = packed_string(r#"Tezos Signed Message: say "hi""#);
        assert_eq!(
            render_packed(&hex).unwrap(),
            r#"Tezos Signed Message: say \"hi\""#
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(unpack_string("").is_err());
        assert!(unpack_string("050").is_err());
        assert!(unpack_string("03deadbeef").is_err());
        // Packed int, not a string.
        assert!(matches!(
            unpack_string("050001"),
            Err(ForgeError::UnknownTag { tag: 0x00, offset: 1 })
        ));
        // Declared length longer than the body.
        assert!(unpack_string("0501000000ff41").is_err());
        // Trailing byte after the body.
        assert!(unpack_string("05010000000141ff").is_err());
        assert!(unpack_string("0501000000").is_err());
        // Invalid UTF-8.
        assert!(unpack_string("050100000001ff").is_err());
    }
}
