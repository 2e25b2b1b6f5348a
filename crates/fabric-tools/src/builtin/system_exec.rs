// SPDX-License-Identifier: MIT OR Apache-2.0
//! Denylist-gated command execution.
//!
//! Local-tier callers only; the command line is checked against the
//! configured denylist before anything is spawned.

use crate::{ToolError, ToolPlugin, object_schema, opt_u64, require_str, safety::SafetyPolicy};
use async_trait::async_trait;
use fabric_core::{ToolDescriptor, ToolProvider, TrustTier};
use std::collections::BTreeMap;
use std::time::Duration;

/// Output streams are truncated past this many bytes.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Default command deadline.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Run a command through the shell.
pub struct ExecTool {
    policy: SafetyPolicy,
}

impl ExecTool {
    /// Create the tool over the given policy.
    #[must_use]
    pub fn new(policy: SafetyPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl ToolPlugin for ExecTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            tool_id: "system.exec".into(),
            category: "system".into(),
            description: "Execute a command (local callers only, denylist enforced)".into(),
            capabilities: BTreeMap::from([("run".to_string(), "do_run".to_string())]),
            provider: ToolProvider::Builtin,
            input_schemas: BTreeMap::from([(
                "run".to_string(),
                object_schema(
                    &["command"],
                    serde_json::json!({
                        "command": {"type": "string"},
                        "timeout_ms": {"type": "integer", "minimum": 1},
                    }),
                ),
            )]),
        }
    }

    fn max_caller_tier(&self) -> TrustTier {
        TrustTier::Local
    }

    async fn execute(
        &self,
        _capability: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let command = require_str(params, "command")?;
        self.policy.check_command(command)?;

        let timeout = Duration::from_millis(opt_u64(params, "timeout_ms").unwrap_or(DEFAULT_TIMEOUT_MS));

        let output = tokio::time::timeout(
            timeout,
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ToolError::new("EXEC_TIMEOUT", "command exceeded its deadline"))?
        .map_err(|e| ToolError::new("EXEC_FAILED", e.to_string()))?;

        Ok(serde_json::json!({
            "exit_code": output.status.code(),
            "stdout": truncate_lossy(&output.stdout),
            "stderr": truncate_lossy(&output.stderr),
        }))
    }
}

fn truncate_lossy(bytes: &[u8]) -> String {
    let end = bytes.len().min(MAX_OUTPUT_BYTES);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> ExecTool {
        ExecTool::new(SafetyPolicy::rooted_at("."))
    }

    #[tokio::test]
    async fn runs_a_command() {
        let result = tool()
            .execute("run", &serde_json::json!({"command": "echo fabric"}))
            .await
            .unwrap();
        assert_eq!(result["exit_code"], 0);
        assert_eq!(result["stdout"], "fabric\n");
    }

    #[tokio::test]
    async fn denylisted_command_never_spawns() {
        let err = tool()
            .execute("run", &serde_json::json!({"command": "mkfs /dev/sda"}))
            .await
            .unwrap_err();
        assert_eq!(err.code, "COMMAND_DENIED");
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let err = tool()
            .execute(
                "run",
                &serde_json::json!({"command": "sleep 5", "timeout_ms": 50}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, "EXEC_TIMEOUT");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_an_error() {
        let result = tool()
            .execute("run", &serde_json::json!({"command": "false"}))
            .await
            .unwrap();
        assert_eq!(result["exit_code"], 1);
    }
}
