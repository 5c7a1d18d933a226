//! Best-effort human-readable preview of sign payloads.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{OperationParser, ParsedOperation};
use crate::micheline;

/// Packed string starting with "Tezos Signed Message: ".
const SIGNED_MESSAGE_PATTERN: &str =
    "^0501[a-f0-9]{8}54657a6f73205369676e6564204d6573736167653a20[a-f0-9]*$";

/// Generic operation watermark.
const OPERATION_WATERMARK: &str = "03";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignPreview {
    Message { value: String },
    Operation(ParsedOperation),
}

fn signed_message_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SIGNED_MESSAGE_PATTERN).ok())
        .as_ref()
}

pub fn is_signed_message(payload: &str) -> bool {
    signed_message_regex().is_some_and(|re| re.is_match(payload))
}

/// Build a preview for a normalized hex payload. Never fails: any decoding
/// problem yields `None` and the request proceeds without a preview.
pub async fn build_sign_preview(
    parser: &dyn OperationParser,
    rpc: &str,
    payload: &str,
) -> Option<SignPreview> {
    if is_signed_message(payload) {
        return match micheline::render_packed(payload) {
            Ok(value) => Some(SignPreview::Message { value }),
            Err(e) => {
                debug!("Signed message payload did not unpack: {}", e);
                None
            }
        };
    }

    let bytes = payload.strip_prefix(OPERATION_WATERMARK).unwrap_or(payload);
    match parser.parse_operation(rpc, bytes).await {
        Ok(parsed) if !parsed.contents.is_empty() => Some(SignPreview::Operation(parsed)),
        Ok(_) => None,
        Err(e) => {
            debug!("Sign payload is not a parseable operation: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::error::ForgeError;

    struct FixedParser {
        result: Option<ParsedOperation>,
        seen: Mutex<Vec<String>>,
    }

    impl FixedParser {
        fn new(result: Option<ParsedOperation>) -> Self {
            Self {
                result,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OperationParser for FixedParser {
        async fn parse_operation(
            &self,
            _rpc: &str,
            bytes: &str,
        ) -> Result<ParsedOperation, ForgeError> {
            self.seen.lock().unwrap().push(bytes.to_string());
            self.result
                .clone()
                .ok_or_else(|| ForgeError::Invalid("not an operation".to_string()))
        }
    }

    // "Tezos Signed Message: hi" packed as a Micheline string.
    const SIGNED_HI: &str = "05010000001854657a6f73205369676e6564204d6573736167653a206869";

    #[tokio::test]
    async fn renders_signed_messages_without_the_parser() {
        let parser = FixedParser::new(None);
        let preview = build_sign_preview(&parser, "http://rpc", SIGNED_HI).await;
        assert_eq!(
            preview,
            Some(SignPreview::Message {
                value: "Tezos Signed Message: hi".to_string()
            })
        );
        assert!(parser.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_signed_message_has_no_preview() {
        // Declared length runs past the end of the data.
        let broken = "0501000000ff54657a6f73205369676e6564204d6573736167653a206869";
        assert!(is_signed_message(broken));
        let parser = FixedParser::new(None);
        assert_eq!(build_sign_preview(&parser, "http://rpc", broken).await, None);
    }

    #[tokio::test]
    async fn operations_are_parsed_after_the_watermark() {
        let parsed = ParsedOperation {
            branch: "BLockGenesisGenesisGenesisGenesisGenesisf79b5d1CoW2".to_string(),
            contents: vec![json!({"kind": "transaction"})],
        };
        let parser = FixedParser::new(Some(parsed.clone()));
        let preview = build_sign_preview(&parser, "http://rpc", "03abcd").await;
        assert_eq!(preview, Some(SignPreview::Operation(parsed)));
        assert_eq!(parser.seen.lock().unwrap().as_slice(), &["abcd".to_string()]);
    }

    #[tokio::test]
    async fn empty_or_failed_parses_have_no_preview() {
        let empty = FixedParser::new(Some(ParsedOperation {
            branch: "B".to_string(),
            contents: vec![],
        }));
        assert_eq!(build_sign_preview(&empty, "http://rpc", "abcd").await, None);

        let failing = FixedParser::new(None);
        assert_eq!(build_sign_preview(&failing, "http://rpc", "abcd").await, None);
    }

    #[test]
    fn preview_wire_shape() {
        let value = serde_json::to_value(SignPreview::Message {
            value: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "message", "value": "hi"}));
    }
}
