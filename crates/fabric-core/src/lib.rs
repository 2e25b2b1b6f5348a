// SPDX-License-Identifier: MIT OR Apache-2.0
//! fabric-core
//!
//! The stable contract for the fabric gateway.
//!
//! If you only take one dependency, take this one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Canonical in-process call envelope.
pub mod envelope;
/// Bus message model.
pub mod message;
/// Typed streaming events.
pub mod stream;
/// Distributed trace identifiers.
pub mod trace;
/// Wire request/response envelopes.
pub mod wire;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub use envelope::{CallInput, CanonicalEnvelope, ResponseSpec, TargetKind, TargetSpec};
pub use message::{Message, MessagePriority};
pub use stream::{StreamEvent, StreamEventKind};
pub use trace::TraceContext;
pub use wire::{CallRequest, CallResponse};

/// Current protocol version string embedded in health responses.
///
/// # Examples
///
/// ```
/// assert_eq!(fabric_core::PROTOCOL_VERSION, "fabric/v1");
/// ```
pub const PROTOCOL_VERSION: &str = "fabric/v1";

/// Default per-capability timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// Agent model
// ---------------------------------------------------------------------------

/// A registered agent: identity, endpoint, capabilities, and health state.
///
/// Unknown manifest-file fields survive a load/store round trip via the
/// flattened `extra` map (the loader is permissive by contract).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentManifest {
    /// Unique, URL-safe agent identifier.
    pub agent_id: String,

    /// Human-readable display name.
    pub display_name: String,

    /// Agent software version.
    #[serde(default)]
    pub version: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Which adapter speaks this agent's protocol.
    pub runtime_kind: RuntimeKind,

    /// Where the agent is reachable.
    pub endpoint: EndpointSpec,

    /// Ordered capability list.
    #[serde(default)]
    pub capabilities: Vec<CapabilityDescriptor>,

    /// Grouping tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Policy class gating sensitive operations.
    #[serde(default)]
    pub trust_tier: TrustTier,

    /// Current health status.
    #[serde(default)]
    pub status: AgentStatus,

    /// When the agent was last seen healthy (heartbeat or probe).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,

    /// Unknown manifest fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AgentManifest {
    /// Look up a capability descriptor by name.
    #[must_use]
    pub fn capability(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    /// Returns `true` if the manifest declares the named capability.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capability(name).is_some()
    }

    /// Validate identifier fields.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the agent id is empty or contains
    /// characters outside `[A-Za-z0-9._~-]`.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.agent_id.is_empty() {
            return Err(ManifestError::EmptyAgentId);
        }
        if !self
            .agent_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~'))
        {
            return Err(ManifestError::InvalidAgentId {
                agent_id: self.agent_id.clone(),
            });
        }
        if self.display_name.is_empty() {
            return Err(ManifestError::EmptyDisplayName);
        }
        Ok(())
    }
}

/// Errors from manifest validation.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The agent id was empty.
    #[error("agent_id must not be empty")]
    EmptyAgentId,
    /// The agent id contained non-URL-safe characters.
    #[error("agent_id '{agent_id}' is not URL-safe")]
    InvalidAgentId {
        /// The offending id.
        agent_id: String,
    },
    /// The display name was empty.
    #[error("display_name must not be empty")]
    EmptyDisplayName,
}

/// Which protocol family an agent speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    /// The gateway's native `{name, arguments}` protocol.
    Native,
    /// The agent-zero style `{action_name, params}` protocol.
    ZeroStyle,
    /// A per-agent custom HTTP shape.
    CustomHttp,
}

/// Network location of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EndpointSpec {
    /// Transport scheme.
    pub transport: Transport,
    /// Endpoint URI (meaning depends on the transport).
    pub uri: String,
}

/// Transport scheme for an agent endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Plain HTTP(S).
    Http,
    /// WebSocket (reserved; dispatched over HTTP upgrade).
    Ws,
    /// In-process (mock/test agents).
    Local,
    /// Child process over standard streams.
    Stdio,
}

/// Policy class gating sensitive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    /// Same-host, fully trusted.
    #[default]
    Local,
    /// Same organization.
    Org,
    /// Untrusted public callers.
    Public,
}

/// Agent health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Last probe succeeded.
    Online,
    /// Recent probes are failing but the agent is still dispatchable.
    Degraded,
    /// Health has not been determined yet.
    #[default]
    Unknown,
    /// The agent is unreachable.
    Offline,
}

impl AgentStatus {
    /// Sort rank used for stable listing: online < degraded < unknown < offline.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::Online => 0,
            Self::Degraded => 1,
            Self::Unknown => 2,
            Self::Offline => 3,
        }
    }

    /// Returns `true` if calls may be routed to an agent in this status.
    #[must_use]
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Online | Self::Degraded)
    }
}

// ---------------------------------------------------------------------------
// Capability model
// ---------------------------------------------------------------------------

/// A named operation an agent can perform.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CapabilityDescriptor {
    /// Capability name, unique within the agent.
    pub name: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Whether the capability can produce a streamed event sequence.
    #[serde(default)]
    pub streaming: bool,

    /// Supported modalities (e.g. `"text"`, `"image"`).
    #[serde(default)]
    pub modalities: BTreeSet<String>,

    /// Optional JSON-Schema document for the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,

    /// Optional JSON-Schema document for the output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,

    /// Per-call deadline ceiling in milliseconds.
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
}

fn default_max_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl CapabilityDescriptor {
    /// Create a minimal non-streaming capability with default timeout.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            streaming: false,
            modalities: BTreeSet::new(),
            input_schema: None,
            output_schema: None,
            max_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Builder-style: mark the capability as streaming.
    #[must_use]
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

// ---------------------------------------------------------------------------
// Tool model
// ---------------------------------------------------------------------------

/// Where a hosted tool implementation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolProvider {
    /// Compiled into the gateway.
    Builtin,
    /// Registered by an external process.
    External,
    /// Re-exported from an MCP server.
    Mcp,
}

/// Descriptor for a locally-hosted tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolDescriptor {
    /// Dotted tool identifier, e.g. `math.calculate`.
    pub tool_id: String,

    /// Tool category (first dotted segment by convention).
    pub category: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Capability name → dispatch method name.
    pub capabilities: BTreeMap<String, String>,

    /// Implementation provenance.
    pub provider: ToolProvider,

    /// Optional JSON-Schema for tool parameters, keyed by capability.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input_schemas: BTreeMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Auth model
// ---------------------------------------------------------------------------

/// How the caller authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Pre-shared key.
    Psk,
    /// Agent passport (shape reserved; not yet verified).
    Passport,
    /// Mutual TLS (reserved).
    Mtls,
    /// Unauthenticated local caller.
    None,
}

/// The authenticated caller identity attached to every envelope.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AuthContext {
    /// Authentication mode that admitted the caller.
    pub mode: AuthMode,

    /// Caller principal identifier.
    pub principal_id: String,

    /// Passport identifier, when the caller presented one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_passport_id: Option<String>,

    /// Reserved signature material (carried, never verified here).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AuthContext {
    /// Context for an unauthenticated local caller.
    #[must_use]
    pub fn local() -> Self {
        Self {
            mode: AuthMode::None,
            principal_id: "local".into(),
            agent_passport_id: None,
            signature: None,
        }
    }

    /// Context for a caller admitted by PSK.
    #[must_use]
    pub fn psk(principal_id: impl Into<String>) -> Self {
        Self {
            mode: AuthMode::Psk,
            principal_id: principal_id.into(),
            agent_passport_id: None,
            signature: None,
        }
    }
}
