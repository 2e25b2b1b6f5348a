// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment inspection behind the sensitive-name filter.

use crate::{ToolError, ToolPlugin, object_schema, require_str, safety::SafetyPolicy};
use async_trait::async_trait;
use fabric_core::{ToolDescriptor, ToolProvider, TrustTier};
use std::collections::BTreeMap;

/// Read environment variables, hiding sensitive names.
pub struct EnvTool {
    policy: SafetyPolicy,
}

impl EnvTool {
    /// Create the tool over the given policy.
    #[must_use]
    pub fn new(policy: SafetyPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl ToolPlugin for EnvTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            tool_id: "env.inspect".into(),
            category: "env".into(),
            description: "Inspect environment variables (sensitive names filtered)".into(),
            capabilities: BTreeMap::from([
                ("get".to_string(), "do_get".to_string()),
                ("list".to_string(), "do_list".to_string()),
            ]),
            provider: ToolProvider::Builtin,
            input_schemas: BTreeMap::from([(
                "get".to_string(),
                object_schema(&["name"], serde_json::json!({"name": {"type": "string"}})),
            )]),
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
            "get" => {
                let name = require_str(params, "name")?;
                if self.policy.is_sensitive_env(name) {
                    return Err(ToolError::new("ENV_DENIED", "variable name is filtered"));
                }
                Ok(serde_json::json!({"name": name, "value": std::env::var(name).ok()}))
            }
            "list" => {
                let mut names: Vec<String> = std::env::vars()
                    .map(|(name, _)| name)
                    .filter(|name| !self.policy.is_sensitive_env(name))
                    .collect();
                names.sort();
                Ok(serde_json::json!({"names": names}))
            }
            other => Err(ToolError::invalid_params(format!("unknown capability '{other}'"))),
        }
    }
}
