// SPDX-License-Identifier: MIT OR Apache-2.0
//! fabric-tools
//!
//! The tool plugin host: discovery, dispatch, and per-tool safety rules.
//!
//! Discovery is static — the builtin set is assembled once at startup and
//! new plugins require a restart. Each plugin declares its descriptor
//! (tool id, capability → method mapping, parameter schemas); the host
//! resolves `(tool_id, capability)`, validates parameters against the
//! declared shape, enforces the trust-tier gate, and invokes the method.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Builtin tool implementations.
pub mod builtin;
/// Safety constraints shared by the sensitive tools.
pub mod safety;

use async_trait::async_trait;
use fabric_core::{ToolDescriptor, ToolProvider, TrustTier};
use fabric_error::{ErrorCode, GatewayError};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

pub use safety::SafetyPolicy;

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

/// A tool-defined failure, surfaced as `TOOL_EXECUTION_ERROR` with the
/// tool's sub-code under `details.tool_code`.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ToolError {
    /// Tool-defined machine-readable sub-code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl ToolError {
    /// Create a tool error.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for the parameter-shape sub-code.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new("INVALID_PARAMETERS", message)
    }
}

// ---------------------------------------------------------------------------
// ToolPlugin
// ---------------------------------------------------------------------------

/// A locally-hosted tool implementation.
#[async_trait]
pub trait ToolPlugin: Send + Sync {
    /// The tool's descriptor: id, category, capability mapping, schemas.
    fn descriptor(&self) -> ToolDescriptor;

    /// The least-privileged caller tier allowed to run this tool.
    ///
    /// `Public` (the default) admits everyone; `Local` restricts the tool
    /// to same-host callers.
    fn max_caller_tier(&self) -> TrustTier {
        TrustTier::Public
    }

    /// Execute one capability. The host has already validated `params`
    /// against the declared schema when one exists.
    async fn execute(
        &self,
        capability: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError>;
}

// ---------------------------------------------------------------------------
// ToolHost
// ---------------------------------------------------------------------------

/// Filter for [`ToolHost::list`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    /// Keep only tools in this category.
    pub category: Option<String>,
    /// Keep only tools from this provider.
    pub provider: Option<ToolProvider>,
}

/// The tool host. Cheap to clone; all clones share the same table.
#[derive(Clone)]
pub struct ToolHost {
    tools: Arc<RwLock<BTreeMap<String, Arc<dyn ToolPlugin>>>>,
}

impl ToolHost {
    /// An empty host.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// A host populated with every builtin tool.
    #[must_use]
    pub fn with_builtins(policy: SafetyPolicy) -> Self {
        let host = Self::new();
        for tool in builtin::all(policy) {
            host.register(tool);
        }
        info!(target: "fabric.tools", count = host.len(), "builtin tools discovered");
        host
    }

    /// Register a plugin, replacing any previous one with the same id.
    pub fn register(&self, tool: Arc<dyn ToolPlugin>) {
        let id = tool.descriptor().tool_id;
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tool);
    }

    /// Number of hosted tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no tools are hosted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// List descriptors matching the filter, ordered by tool id.
    #[must_use]
    pub fn list(&self, filter: &ToolFilter) -> Vec<ToolDescriptor> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|t| t.descriptor())
            .filter(|d| {
                filter
                    .category
                    .as_ref()
                    .is_none_or(|c| &d.category == c)
                    && filter.provider.is_none_or(|p| d.provider == p)
            })
            .collect()
    }

    /// Describe one tool.
    ///
    /// # Errors
    ///
    /// `TOOL_NOT_FOUND` when the id is not hosted.
    pub fn describe(&self, tool_id: &str) -> Result<ToolDescriptor, GatewayError> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tool_id)
            .map(|t| t.descriptor())
            .ok_or_else(|| tool_not_found(tool_id))
    }

    /// Execute `(tool_id, capability)` with the given parameters.
    ///
    /// # Errors
    ///
    /// `TOOL_NOT_FOUND`, `CAPABILITY_NOT_FOUND`, or `TOOL_EXECUTION_ERROR`
    /// (carrying the tool sub-code under `details.tool_code`).
    pub async fn execute(
        &self,
        tool_id: &str,
        capability: &str,
        params: &serde_json::Value,
        caller_tier: TrustTier,
    ) -> Result<serde_json::Value, GatewayError> {
        let tool = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tool_id)
            .cloned()
            .ok_or_else(|| tool_not_found(tool_id))?;

        let descriptor = tool.descriptor();
        if !descriptor.capabilities.contains_key(capability) {
            return Err(GatewayError::new(
                ErrorCode::CapabilityNotFound,
                format!("tool '{tool_id}' has no capability '{capability}'"),
            )
            .with_detail("tool_id", tool_id)
            .with_detail("capability", capability));
        }

        // Trust-tier gate: a caller less trusted than the tool's ceiling is
        // rejected before parameters are even looked at.
        if caller_tier > tool.max_caller_tier() {
            return Err(execution_error(
                tool_id,
                &ToolError::new("TRUST_DENIED", "caller trust tier too low for this tool"),
            ));
        }

        if let Some(schema) = descriptor.input_schemas.get(capability) {
            validate_params(schema, params).map_err(|e| execution_error(tool_id, &e))?;
        }

        debug!(target: "fabric.tools", tool_id, capability, "executing tool");
        tool.execute(capability, params)
            .await
            .map_err(|e| execution_error(tool_id, &e))
    }
}

impl Default for ToolHost {
    fn default() -> Self {
        Self::new()
    }
}

fn tool_not_found(tool_id: &str) -> GatewayError {
    GatewayError::new(
        ErrorCode::ToolNotFound,
        format!("tool '{tool_id}' is not hosted"),
    )
    .with_detail("tool_id", tool_id)
}

fn execution_error(tool_id: &str, e: &ToolError) -> GatewayError {
    GatewayError::new(ErrorCode::ToolExecutionError, e.message.clone())
        .with_detail("tool_id", tool_id)
        .with_detail("tool_code", e.code)
}

/// Validate parameters against a declared JSON-Schema shape.
fn validate_params(schema: &serde_json::Value, params: &serde_json::Value) -> Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| ToolError::new("BAD_SCHEMA", e.to_string()))?;
    if let Some(first) = validator.iter_errors(params).next() {
        return Err(ToolError::invalid_params(first.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parameter helpers shared by builtin tools
// ---------------------------------------------------------------------------

pub(crate) fn require_str<'a>(
    params: &'a serde_json::Value,
    field: &str,
) -> Result<&'a str, ToolError> {
    params
        .get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ToolError::invalid_params(format!("'{field}' must be a string")))
}

pub(crate) fn opt_bool(params: &serde_json::Value, field: &str) -> Option<bool> {
    params.get(field).and_then(serde_json::Value::as_bool)
}

pub(crate) fn opt_u64(params: &serde_json::Value, field: &str) -> Option<u64> {
    params.get(field).and_then(serde_json::Value::as_u64)
}

/// Shorthand for a required-string object schema.
pub(crate) fn object_schema(required: &[&str], properties: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": required,
        "properties": properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UpperTool;

    #[async_trait]
    impl ToolPlugin for UpperTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                tool_id: "test.upper".into(),
                category: "test".into(),
                description: "uppercases".into(),
                capabilities: BTreeMap::from([("shout".to_string(), "do_shout".to_string())]),
                provider: ToolProvider::Builtin,
                input_schemas: BTreeMap::from([(
                    "shout".to_string(),
                    object_schema(&["text"], serde_json::json!({"text": {"type": "string"}})),
                )]),
            }
        }

        async fn execute(
            &self,
            _capability: &str,
            params: &serde_json::Value,
        ) -> Result<serde_json::Value, ToolError> {
            let text = require_str(params, "text")?;
            Ok(serde_json::json!({"text": text.to_uppercase()}))
        }
    }

    struct LocalOnlyTool;

    #[async_trait]
    impl ToolPlugin for LocalOnlyTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                tool_id: "test.sensitive".into(),
                category: "test".into(),
                description: String::new(),
                capabilities: BTreeMap::from([("run".to_string(), "do_run".to_string())]),
                provider: ToolProvider::Builtin,
                input_schemas: BTreeMap::new(),
            }
        }

        fn max_caller_tier(&self) -> TrustTier {
            TrustTier::Local
        }

        async fn execute(
            &self,
            _capability: &str,
            _params: &serde_json::Value,
        ) -> Result<serde_json::Value, ToolError> {
            Ok(serde_json::json!({"ran": true}))
        }
    }

    fn host() -> ToolHost {
        let host = ToolHost::new();
        host.register(Arc::new(UpperTool));
        host.register(Arc::new(LocalOnlyTool));
        host
    }

    #[tokio::test]
    async fn execute_dispatches_capability() {
        let result = host()
            .execute(
                "test.upper",
                "shout",
                &serde_json::json!({"text": "hi"}),
                TrustTier::Public,
            )
            .await
            .unwrap();
        assert_eq!(result["text"], "HI");
    }

    #[tokio::test]
    async fn unknown_tool_and_capability() {
        let host = host();
        let err = host
            .execute("test.missing", "x", &serde_json::Value::Null, TrustTier::Local)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ToolNotFound);

        let err = host
            .execute("test.upper", "whisper", &serde_json::Value::Null, TrustTier::Local)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CapabilityNotFound);
    }

    #[tokio::test]
    async fn schema_validation_rejects_bad_params() {
        let err = host()
            .execute(
                "test.upper",
                "shout",
                &serde_json::json!({"text": 42}),
                TrustTier::Public,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ToolExecutionError);
        assert_eq!(err.details["tool_code"], "INVALID_PARAMETERS");
    }

    #[tokio::test]
    async fn trust_tier_gate() {
        let host = host();
        let err = host
            .execute("test.sensitive", "run", &serde_json::json!({}), TrustTier::Org)
            .await
            .unwrap_err();
        assert_eq!(err.details["tool_code"], "TRUST_DENIED");

        let ok = host
            .execute("test.sensitive", "run", &serde_json::json!({}), TrustTier::Local)
            .await
            .unwrap();
        assert_eq!(ok["ran"], true);
    }

    #[test]
    fn list_filters_by_category_and_provider() {
        let host = host();
        assert_eq!(host.list(&ToolFilter::default()).len(), 2);
        let filtered = host.list(&ToolFilter {
            category: Some("test".into()),
            provider: Some(ToolProvider::Builtin),
        });
        assert_eq!(filtered.len(), 2);
        let none = host.list(&ToolFilter {
            category: Some("absent".into()),
            provider: None,
        });
        assert!(none.is_empty());
    }

    #[test]
    fn describe_roundtrip() {
        let host = host();
        let d = host.describe("test.upper").unwrap();
        assert_eq!(d.category, "test");
        assert!(host.describe("nope").is_err());
    }
}
