// SPDX-License-Identifier: MIT OR Apache-2.0
//! Case/replace/split text helpers.

use crate::{ToolError, ToolPlugin, object_schema, require_str};
use async_trait::async_trait;
use fabric_core::{ToolDescriptor, ToolProvider};
use std::collections::BTreeMap;

/// Plain text transformations.
pub struct TextTransformTool;

#[async_trait]
impl ToolPlugin for TextTransformTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            tool_id: "text.transform".into(),
            category: "text".into(),
            description: "Case conversion, substring replacement, splitting".into(),
            capabilities: BTreeMap::from([
                ("case".to_string(), "do_case".to_string()),
                ("replace".to_string(), "do_replace".to_string()),
                ("split".to_string(), "do_split".to_string()),
            ]),
            provider: ToolProvider::Builtin,
            input_schemas: BTreeMap::from([
                (
                    "case".to_string(),
                    object_schema(
                        &["text", "mode"],
                        serde_json::json!({
                            "text": {"type": "string"},
                            "mode": {"enum": ["upper", "lower", "title"]},
                        }),
                    ),
                ),
                (
                    "replace".to_string(),
                    object_schema(
                        &["text", "from", "to"],
                        serde_json::json!({
                            "text": {"type": "string"},
                            "from": {"type": "string"},
                            "to": {"type": "string"},
                        }),
                    ),
                ),
                (
                    "split".to_string(),
                    object_schema(
                        &["text", "separator"],
                        serde_json::json!({
                            "text": {"type": "string"},
                            "separator": {"type": "string"},
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
        match capability {
            "case" => {
                let mode = require_str(params, "mode")?;
                let out = match mode {
                    "upper" => text.to_uppercase(),
                    "lower" => text.to_lowercase(),
                    "title" => title_case(text),
                    other => {
                        return Err(ToolError::invalid_params(format!("unknown mode '{other}'")));
                    }
                };
                Ok(serde_json::json!({"text": out}))
            }
            "replace" => {
                let from = require_str(params, "from")?;
                let to = require_str(params, "to")?;
                Ok(serde_json::json!({"text": text.replace(from, to)}))
            }
            "split" => {
                let separator = require_str(params, "separator")?;
                let parts: Vec<&str> = if separator.is_empty() {
                    text.split_whitespace().collect()
                } else {
                    text.split(separator).collect()
                };
                Ok(serde_json::json!({"parts": parts}))
            }
            other => Err(ToolError::invalid_params(format!("unknown capability '{other}'"))),
        }
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn case_modes() {
        let t = TextTransformTool;
        let upper = t
            .execute("case", &serde_json::json!({"text": "abc", "mode": "upper"}))
            .await
            .unwrap();
        assert_eq!(upper["text"], "ABC");

        let title = t
            .execute("case", &serde_json::json!({"text": "hello wide world", "mode": "title"}))
            .await
            .unwrap();
        assert_eq!(title["text"], "Hello Wide World");
    }

    #[tokio::test]
    async fn replace_and_split() {
        let t = TextTransformTool;
        let replaced = t
            .execute(
                "replace",
                &serde_json::json!({"text": "a-b-c", "from": "-", "to": "+"}),
            )
            .await
            .unwrap();
        assert_eq!(replaced["text"], "a+b+c");

        let split = t
            .execute("split", &serde_json::json!({"text": "a,b,c", "separator": ","}))
            .await
            .unwrap();
        assert_eq!(split["parts"], serde_json::json!(["a", "b", "c"]));
    }
}
