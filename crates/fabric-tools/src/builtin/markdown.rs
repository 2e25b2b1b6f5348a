// SPDX-License-Identifier: MIT OR Apache-2.0
//! Markdown rendering.

use crate::{ToolError, ToolPlugin, object_schema, require_str};
use async_trait::async_trait;
use fabric_core::{ToolDescriptor, ToolProvider};
use std::collections::BTreeMap;

/// Render Markdown to HTML.
pub struct MarkdownTool;

#[async_trait]
impl ToolPlugin for MarkdownTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            tool_id: "text.markdown".into(),
            category: "text".into(),
            description: "Render Markdown to HTML".into(),
            capabilities: BTreeMap::from([("render".to_string(), "do_render".to_string())]),
            provider: ToolProvider::Builtin,
            input_schemas: BTreeMap::from([(
                "render".to_string(),
                object_schema(
                    &["markdown"],
                    serde_json::json!({"markdown": {"type": "string"}}),
                ),
            )]),
        }
    }

    async fn execute(
        &self,
        _capability: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let markdown = require_str(params, "markdown")?;
        let parser = pulldown_cmark::Parser::new(markdown);
        let mut html = String::new();
        pulldown_cmark::html::push_html(&mut html, parser);
        Ok(serde_json::json!({"html": html}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renders_basic_markdown() {
        let result = MarkdownTool
            .execute("render", &serde_json::json!({"markdown": "# Title\n\n*hi*"}))
            .await
            .unwrap();
        let html = result["html"].as_str().unwrap();
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>hi</em>"));
    }
}
