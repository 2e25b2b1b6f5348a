// SPDX-License-Identifier: MIT OR Apache-2.0
//! The canonical in-process form of every dispatched call.
//!
//! Transports normalize their wire requests into a [`CanonicalEnvelope`]
//! before the pipeline routes them; adapters translate the envelope into
//! agent-native protocols.

use crate::trace::TraceContext;
use crate::{AuthContext, DEFAULT_TIMEOUT_MS};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What kind of target a call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A registered agent capability, dispatched through an adapter.
    Agent,
    /// A locally-hosted tool.
    Tool,
    /// A message-bus operation.
    Message,
}

/// Addressing block of a [`CanonicalEnvelope`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TargetSpec {
    /// Target kind.
    pub kind: TargetKind,
    /// Agent id, tool id, or bus operation name.
    pub id: String,
    /// Capability name on the target.
    pub capability: String,
    /// Caller-requested deadline override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Payload block of a [`CanonicalEnvelope`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CallInput {
    /// Primary task text for agent capabilities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Free-form context object forwarded to the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,

    /// Attachment references (URIs or inline blobs).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<serde_json::Value>,

    /// Structured parameters for tool capabilities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Response-shaping block of a [`CanonicalEnvelope`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResponseSpec {
    /// Whether the caller asked for a streamed event sequence.
    #[serde(default)]
    pub stream: bool,
    /// Response format hint (currently always `"json"`).
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "json".into()
}

impl Default for ResponseSpec {
    fn default() -> Self {
        Self {
            stream: false,
            format: default_format(),
        }
    }
}

/// The normalized in-process form of every call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalEnvelope {
    /// Trace identifiers for this execution attempt.
    pub trace: TraceContext,
    /// Authenticated caller.
    pub auth: AuthContext,
    /// What is being called.
    pub target: TargetSpec,
    /// Call payload.
    pub input: CallInput,
    /// Response shaping.
    pub response: ResponseSpec,
}

impl CanonicalEnvelope {
    /// Resolve the effective deadline for this call.
    ///
    /// The caller-supplied `timeout_ms` wins; otherwise the capability's
    /// ceiling applies; otherwise the protocol default.
    #[must_use]
    pub fn deadline(&self, capability_max_ms: Option<u64>) -> Duration {
        let ms = self
            .target
            .timeout_ms
            .or(capability_max_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Duration::from_millis(ms)
    }
}
