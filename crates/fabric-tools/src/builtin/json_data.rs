// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON query/validate/format.

use crate::{ToolError, ToolPlugin, object_schema, opt_bool, require_str};
use async_trait::async_trait;
use fabric_core::{ToolDescriptor, ToolProvider};
use std::collections::BTreeMap;

/// JSON utilities: pointer queries, schema validation, formatting.
pub struct JsonTool;

#[async_trait]
impl ToolPlugin for JsonTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            tool_id: "data.json".into(),
            category: "data".into(),
            description: "JSON pointer queries, schema validation, pretty-printing".into(),
            capabilities: BTreeMap::from([
                ("query".to_string(), "do_query".to_string()),
                ("validate".to_string(), "do_validate".to_string()),
                ("format".to_string(), "do_format".to_string()),
            ]),
            provider: ToolProvider::Builtin,
            input_schemas: BTreeMap::from([
                (
                    "query".to_string(),
                    object_schema(
                        &["json", "pointer"],
                        serde_json::json!({
                            "json": {"type": "string"},
                            "pointer": {"type": "string"},
                        }),
                    ),
                ),
                (
                    "validate".to_string(),
                    object_schema(
                        &["json", "schema"],
                        serde_json::json!({"json": {"type": "string"}}),
                    ),
                ),
                (
                    "format".to_string(),
                    object_schema(
                        &["json"],
                        serde_json::json!({
                            "json": {"type": "string"},
                            "pretty": {"type": "boolean"},
                        }),
                    ),
                ),
            ]),
        }
    }

    async fn execute(
        &self,
        capability: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let parsed: serde_json::Value = serde_json::from_str(require_str(params, "json")?)
            .map_err(|e| ToolError::new("INVALID_JSON", e.to_string()))?;

        match capability {
            "query" => {
                let pointer = require_str(params, "pointer")?;
                Ok(serde_json::json!({
                    "value": parsed.pointer(pointer),
                    "found": parsed.pointer(pointer).is_some(),
                }))
            }
            "validate" => {
                let schema = params
                    .get("schema")
                    .ok_or_else(|| ToolError::invalid_params("'schema' is required"))?;
                let validator = jsonschema::validator_for(schema)
                    .map_err(|e| ToolError::new("BAD_SCHEMA", e.to_string()))?;
                let errors: Vec<String> =
                    validator.iter_errors(&parsed).map(|e| e.to_string()).collect();
                Ok(serde_json::json!({"valid": errors.is_empty(), "errors": errors}))
            }
            "format" => {
                let pretty = opt_bool(params, "pretty").unwrap_or(true);
                let text = if pretty {
                    serde_json::to_string_pretty(&parsed)
                } else {
                    serde_json::to_string(&parsed)
                }
                .map_err(|e| ToolError::new("FORMAT_FAILED", e.to_string()))?;
                Ok(serde_json::json!({"json": text}))
            }
            other => Err(ToolError::invalid_params(format!("unknown capability '{other}'"))),
        }
    }
}
