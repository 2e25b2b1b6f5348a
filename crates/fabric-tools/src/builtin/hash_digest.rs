// SPDX-License-Identifier: MIT OR Apache-2.0
//! SHA-2 digests.

use crate::{ToolError, ToolPlugin, object_schema, require_str};
use async_trait::async_trait;
use fabric_core::{ToolDescriptor, ToolProvider};
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeMap;

/// Hex-encoded SHA-2 digests of text input.
pub struct HashTool;

#[async_trait]
impl ToolPlugin for HashTool {
    fn descriptor(&self) -> ToolDescriptor {
        let schema = object_schema(&["data"], serde_json::json!({"data": {"type": "string"}}));
        ToolDescriptor {
            tool_id: "hash.digest".into(),
            category: "hash".into(),
            description: "SHA-256 and SHA-512 digests".into(),
            capabilities: BTreeMap::from([
                ("sha256".to_string(), "do_sha256".to_string()),
                ("sha512".to_string(), "do_sha512".to_string()),
            ]),
            provider: ToolProvider::Builtin,
            input_schemas: BTreeMap::from([
                ("sha256".to_string(), schema.clone()),
                ("sha512".to_string(), schema),
            ]),
        }
    }

    async fn execute(
        &self,
        capability: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let data = require_str(params, "data")?;
        let digest = match capability {
            "sha256" => format!("{:x}", Sha256::digest(data.as_bytes())),
            "sha512" => format!("{:x}", Sha512::digest(data.as_bytes())),
            other => {
                return Err(ToolError::invalid_params(format!("unknown capability '{other}'")));
            }
        };
        Ok(serde_json::json!({"digest": digest, "algorithm": capability}))
    }
}
