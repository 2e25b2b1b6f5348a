// SPDX-License-Identifier: MIT OR Apache-2.0
//! Regex find/extract/replace.

use crate::{ToolError, ToolPlugin, object_schema, require_str};
use async_trait::async_trait;
use fabric_core::{ToolDescriptor, ToolProvider};
use std::collections::BTreeMap;

/// Longest pattern accepted.
const MAX_PATTERN_LEN: usize = 512;

/// Regex operations over text.
pub struct TextRegexTool;

fn compile(pattern: &str) -> Result<regex::Regex, ToolError> {
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(ToolError::new("PATTERN_TOO_LONG", "pattern exceeds the length cap"));
    }
    regex::Regex::new(pattern).map_err(|e| ToolError::new("INVALID_PATTERN", e.to_string()))
}

#[async_trait]
impl ToolPlugin for TextRegexTool {
    fn descriptor(&self) -> ToolDescriptor {
        let text_and_pattern = serde_json::json!({
            "text": {"type": "string"},
            "pattern": {"type": "string"},
        });
        ToolDescriptor {
            tool_id: "text.regex".into(),
            category: "text".into(),
            description: "Regex matching, extraction, and replacement".into(),
            capabilities: BTreeMap::from([
                ("find".to_string(), "do_find".to_string()),
                ("extract".to_string(), "do_extract".to_string()),
                ("replace".to_string(), "do_replace".to_string()),
            ]),
            provider: ToolProvider::Builtin,
            input_schemas: BTreeMap::from([
                (
                    "find".to_string(),
                    object_schema(&["text", "pattern"], text_and_pattern.clone()),
                ),
                (
                    "extract".to_string(),
                    object_schema(&["text", "pattern"], text_and_pattern),
                ),
                (
                    "replace".to_string(),
                    object_schema(
                        &["text", "pattern", "replacement"],
                        serde_json::json!({
                            "text": {"type": "string"},
                            "pattern": {"type": "string"},
                            "replacement": {"type": "string"},
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
        let text = require_str(params, "text")?;
        let re = compile(require_str(params, "pattern")?)?;

        match capability {
            "find" => {
                let found = re.find(text);
                Ok(serde_json::json!({
                    "matched": found.is_some(),
                    "first": found.map(|m| m.as_str()),
                }))
            }
            "extract" => {
                let matches: Vec<&str> = re.find_iter(text).map(|m| m.as_str()).collect();
                Ok(serde_json::json!({"matches": matches, "count": matches.len()}))
            }
            "replace" => {
                let replacement = require_str(params, "replacement")?;
                Ok(serde_json::json!({
                    "text": re.replace_all(text, replacement).into_owned(),
                }))
            }
            other => Err(ToolError::invalid_params(format!("unknown capability '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_extract_replace() {
        let t = TextRegexTool;
        let found = t
            .execute(
                "find",
                &serde_json::json!({"text": "order-42 ready", "pattern": r"\d+"}),
            )
            .await
            .unwrap();
        assert_eq!(found["matched"], true);
        assert_eq!(found["first"], "42");

        let extracted = t
            .execute(
                "extract",
                &serde_json::json!({"text": "a1 b22 c333", "pattern": r"\d+"}),
            )
            .await
            .unwrap();
        assert_eq!(extracted["matches"], serde_json::json!(["1", "22", "333"]));

        let replaced = t
            .execute(
                "replace",
                &serde_json::json!({"text": "x1y2", "pattern": r"\d", "replacement": "#"}),
            )
            .await
            .unwrap();
        assert_eq!(replaced["text"], "x#y#");
    }

    #[tokio::test]
    async fn invalid_pattern_is_reported() {
        let err = TextRegexTool
            .execute("find", &serde_json::json!({"text": "x", "pattern": "("}))
            .await
            .unwrap_err();
        assert_eq!(err.code, "INVALID_PATTERN");
    }
}
