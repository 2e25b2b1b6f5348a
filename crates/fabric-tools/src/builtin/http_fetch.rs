// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP fetch.

use crate::{ToolError, ToolPlugin, object_schema, require_str};
use async_trait::async_trait;
use fabric_core::{ToolDescriptor, ToolProvider};
use std::collections::BTreeMap;
use std::time::Duration;

/// Response bodies are truncated past this many bytes.
const MAX_BODY_BYTES: usize = 512 * 1024;

/// Per-fetch deadline.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch a URL over http(s).
pub struct HttpFetchTool {
    client: reqwest::Client,
}

impl HttpFetchTool {
    /// Create the tool with a fresh client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolPlugin for HttpFetchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            tool_id: "http.fetch".into(),
            category: "http".into(),
            description: "Fetch a URL and return status and body text".into(),
            capabilities: BTreeMap::from([("get".to_string(), "do_get".to_string())]),
            provider: ToolProvider::Builtin,
            input_schemas: BTreeMap::from([(
                "get".to_string(),
                object_schema(&["url"], serde_json::json!({"url": {"type": "string"}})),
            )]),
        }
    }

    async fn execute(
        &self,
        _capability: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let url = require_str(params, "url")?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::new("SCHEME_DENIED", "only http(s) URLs are allowed"));
        }

        let response = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| ToolError::new("FETCH_FAILED", e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let mut body = response
            .text()
            .await
            .map_err(|e| ToolError::new("FETCH_FAILED", e.to_string()))?;
        let truncated = body.len() > MAX_BODY_BYTES;
        if truncated {
            body.truncate(MAX_BODY_BYTES);
        }

        Ok(serde_json::json!({
            "status": status,
            "content_type": content_type,
            "body": body,
            "truncated": truncated,
        }))
    }
}
