// SPDX-License-Identifier: MIT OR Apache-2.0
//! Path-confined file read/write/list.

use crate::{ToolError, ToolPlugin, object_schema, require_str, safety::SafetyPolicy};
use async_trait::async_trait;
use fabric_core::{ToolDescriptor, ToolProvider, TrustTier};
use std::collections::BTreeMap;

/// Largest file the read capability will return, in bytes.
const MAX_READ_BYTES: u64 = 4 * 1024 * 1024;

/// File I/O confined to the configured root.
pub struct FileIoTool {
    policy: SafetyPolicy,
}

impl FileIoTool {
    /// Create the tool over the given policy.
    #[must_use]
    pub fn new(policy: SafetyPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl ToolPlugin for FileIoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            tool_id: "file.io".into(),
            category: "file".into(),
            description: "Read, write, and list files under the configured root".into(),
            capabilities: BTreeMap::from([
                ("read".to_string(), "do_read".to_string()),
                ("write".to_string(), "do_write".to_string()),
                ("list".to_string(), "do_list".to_string()),
            ]),
            provider: ToolProvider::Builtin,
            input_schemas: BTreeMap::from([
                (
                    "read".to_string(),
                    object_schema(&["path"], serde_json::json!({"path": {"type": "string"}})),
                ),
                (
                    "write".to_string(),
                    object_schema(
                        &["path", "content"],
                        serde_json::json!({
                            "path": {"type": "string"},
                            "content": {"type": "string"},
                        }),
                    ),
                ),
                (
                    "list".to_string(),
                    object_schema(&[], serde_json::json!({"path": {"type": "string"}})),
                ),
            ]),
        }
    }

    fn max_caller_tier(&self) -> TrustTier {
        TrustTier::Org
    }

    async fn execute(
        &self,
        capability: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        match capability {
            "read" => {
                let path = self.policy.resolve_path(require_str(params, "path")?)?;
                let meta = tokio::fs::metadata(&path)
                    .await
                    .map_err(|e| ToolError::new("FILE_NOT_FOUND", e.to_string()))?;
                if meta.len() > MAX_READ_BYTES {
                    return Err(ToolError::new("FILE_TOO_LARGE", "file exceeds the read limit"));
                }
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| ToolError::new("READ_FAILED", e.to_string()))?;
                Ok(serde_json::json!({"content": content, "bytes": meta.len()}))
            }
            "write" => {
                let path = self.policy.resolve_path(require_str(params, "path")?)?;
                let content = require_str(params, "content")?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| ToolError::new("WRITE_FAILED", e.to_string()))?;
                }
                tokio::fs::write(&path, content)
                    .await
                    .map_err(|e| ToolError::new("WRITE_FAILED", e.to_string()))?;
                Ok(serde_json::json!({"written": content.len()}))
            }
            "list" => {
                let rel = params
                    .get("path")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or(".");
                let dir = self.policy.resolve_path(rel)?;
                let mut entries = tokio::fs::read_dir(&dir)
                    .await
                    .map_err(|e| ToolError::new("LIST_FAILED", e.to_string()))?;
                let mut names = Vec::new();
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| ToolError::new("LIST_FAILED", e.to_string()))?
                {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
                names.sort();
                Ok(serde_json::json!({"entries": names}))
            }
            other => Err(ToolError::invalid_params(format!("unknown capability '{other}'"))),
        }
    }
}
