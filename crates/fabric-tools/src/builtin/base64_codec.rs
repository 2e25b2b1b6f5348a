// SPDX-License-Identifier: MIT OR Apache-2.0
//! Base64 encode/decode.

use crate::{ToolError, ToolPlugin, object_schema, require_str};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use fabric_core::{ToolDescriptor, ToolProvider};
use std::collections::BTreeMap;

/// Standard-alphabet base64.
pub struct Base64Tool;

#[async_trait]
impl ToolPlugin for Base64Tool {
    fn descriptor(&self) -> ToolDescriptor {
        let schema = object_schema(&["data"], serde_json::json!({"data": {"type": "string"}}));
        ToolDescriptor {
            tool_id: "encode.base64".into(),
            category: "encode".into(),
            description: "Base64 encoding and decoding".into(),
            capabilities: BTreeMap::from([
                ("encode".to_string(), "do_encode".to_string()),
                ("decode".to_string(), "do_decode".to_string()),
            ]),
            provider: ToolProvider::Builtin,
            input_schemas: BTreeMap::from([
                ("encode".to_string(), schema.clone()),
                ("decode".to_string(), schema),
            ]),
        }
    }

    async fn execute(
        &self,
        capability: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let data = require_str(params, "data")?;
        match capability {
            "encode" => Ok(serde_json::json!({"encoded": BASE64.encode(data.as_bytes())})),
            "decode" => {
                let bytes = BASE64
                    .decode(data)
                    .map_err(|e| ToolError::new("INVALID_BASE64", e.to_string()))?;
                let text = String::from_utf8(bytes)
                    .map_err(|_| ToolError::new("INVALID_UTF8", "decoded bytes are not UTF-8"))?;
                Ok(serde_json::json!({"decoded": text}))
            }
            other => Err(ToolError::invalid_params(format!("unknown capability '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encode_decode_roundtrip() {
        let t = Base64Tool;
        let encoded = t
            .execute("encode", &serde_json::json!({"data": "fabric"}))
            .await
            .unwrap();
        assert_eq!(encoded["encoded"], "ZmFicmlj");

        let decoded = t
            .execute("decode", &serde_json::json!({"data": "ZmFicmlj"}))
            .await
            .unwrap();
        assert_eq!(decoded["decoded"], "fabric");
    }

    #[tokio::test]
    async fn invalid_input_is_reported() {
        let err = Base64Tool
            .execute("decode", &serde_json::json!({"data": "!!!"}))
            .await
            .unwrap_err();
        assert_eq!(err.code, "INVALID_BASE64");
    }
}
