// SPDX-License-Identifier: MIT OR Apache-2.0
//! fabric-adapters
//!
//! The runtime adapter layer: one contract, three protocol dialects.
//!
//! An adapter translates a [`CanonicalEnvelope`] into an agent's native
//! request shape, and the agent's response (single body or event stream)
//! back into the canonical `{ok, result | error}` form. Adapters hold a
//! snapshot of the manifest they were constructed against and must tolerate
//! the registry entry disappearing between calls.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Per-agent custom HTTP dialect.
pub mod custom;
/// Shared HTTP plumbing: sync posts, SSE reading, deadlines.
pub mod http;
/// Scripted in-process adapter for tests and local agents.
pub mod mock;
/// The gateway's native `{name, arguments}` dialect.
pub mod native;
/// The agent-zero style `{action_name, params}` dialect.
pub mod zero;

use async_trait::async_trait;
use fabric_core::{AgentManifest, AgentStatus, CanonicalEnvelope, RuntimeKind, StreamEvent, Transport};
use fabric_error::{ErrorCode, GatewayError};
use fabric_registry::HealthProbe;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

pub use custom::CustomHttpAdapter;
pub use mock::MockAdapter;
pub use native::NativeAdapter;
pub use zero::ZeroStyleAdapter;

/// A lazy sequence of streamed events, terminated by a `final` event.
pub type EventStream = ReceiverStream<StreamEvent>;

/// A translator between the canonical envelope and an agent's protocol.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Execute the envelope and return the result payload.
    ///
    /// # Errors
    ///
    /// `TIMEOUT` when the deadline expires, `AGENT_OFFLINE` when the agent
    /// is unreachable, `UPSTREAM_ERROR` for protocol or agent failures.
    async fn call(&self, envelope: &CanonicalEnvelope) -> Result<serde_json::Value, GatewayError>;

    /// Execute the envelope as a streamed event sequence.
    ///
    /// The returned stream always terminates with a `final` event; dropping
    /// it closes the underlying transport.
    ///
    /// # Errors
    ///
    /// Same error surface as [`call`](Self::call) for failures before the
    /// stream is established; later failures arrive as a terminal event.
    async fn call_stream(&self, envelope: &CanonicalEnvelope) -> Result<EventStream, GatewayError>;

    /// Probe the agent's health.
    async fn probe_health(&self) -> AgentStatus;

    /// The manifest snapshot this adapter was constructed against.
    fn describe(&self) -> AgentManifest;
}

impl std::fmt::Debug for dyn RuntimeAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeAdapter")
            .field("manifest", &self.describe())
            .finish()
    }
}

/// Builds adapters for manifests. The pipeline resolves an adapter per
/// dispatch, so fallback chains always reflect the current registry.
pub trait AdapterFactory: Send + Sync {
    /// Build an adapter for the given manifest.
    ///
    /// # Errors
    ///
    /// Returns `AGENT_OFFLINE` if the manifest's transport cannot be
    /// dispatched by this factory.
    fn adapter_for(&self, manifest: &AgentManifest) -> Result<Arc<dyn RuntimeAdapter>, GatewayError>;
}

/// Default factory: HTTP transports per [`RuntimeKind`], plus an echoing
/// [`MockAdapter`] for `local` endpoints.
pub struct HttpAdapterFactory {
    client: reqwest::Client,
}

impl HttpAdapterFactory {
    /// Create a factory with a fresh pooled HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpAdapterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterFactory for HttpAdapterFactory {
    fn adapter_for(&self, manifest: &AgentManifest) -> Result<Arc<dyn RuntimeAdapter>, GatewayError> {
        match manifest.endpoint.transport {
            Transport::Local => Ok(Arc::new(MockAdapter::echo(manifest.clone()))),
            Transport::Http | Transport::Ws => match manifest.runtime_kind {
                RuntimeKind::Native => Ok(Arc::new(NativeAdapter::new(
                    self.client.clone(),
                    manifest.clone(),
                ))),
                RuntimeKind::ZeroStyle => Ok(Arc::new(ZeroStyleAdapter::new(
                    self.client.clone(),
                    manifest.clone(),
                ))),
                RuntimeKind::CustomHttp => Ok(Arc::new(CustomHttpAdapter::new(
                    self.client.clone(),
                    manifest.clone(),
                ))),
            },
            Transport::Stdio => Err(GatewayError::new(
                ErrorCode::AgentOffline,
                format!(
                    "agent '{}' uses the stdio transport, which has no adapter yet",
                    manifest.agent_id
                ),
            )),
        }
    }
}

/// Health-probe glue: lets the registry's prober drive adapter probes.
pub struct AdapterHealthProbe<F: AdapterFactory> {
    factory: F,
}

impl<F: AdapterFactory> AdapterHealthProbe<F> {
    /// Wrap a factory for use by the health prober.
    #[must_use]
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl<F: AdapterFactory> HealthProbe for AdapterHealthProbe<F> {
    async fn probe(&self, manifest: &AgentManifest) -> AgentStatus {
        match self.factory.adapter_for(manifest) {
            Ok(adapter) => adapter.probe_health().await,
            Err(_) => AgentStatus::Offline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::{CapabilityDescriptor, EndpointSpec};

    fn manifest(kind: RuntimeKind, transport: Transport) -> AgentManifest {
        AgentManifest {
            agent_id: "a".into(),
            display_name: "A".into(),
            version: "1.0".into(),
            description: String::new(),
            runtime_kind: kind,
            endpoint: EndpointSpec {
                transport,
                uri: "http://127.0.0.1:1".into(),
            },
            capabilities: vec![CapabilityDescriptor::named("reason")],
            tags: Default::default(),
            trust_tier: Default::default(),
            status: AgentStatus::Online,
            last_seen_at: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn factory_selects_by_runtime_kind() {
        let factory = HttpAdapterFactory::new();
        for kind in [RuntimeKind::Native, RuntimeKind::ZeroStyle, RuntimeKind::CustomHttp] {
            let adapter = factory.adapter_for(&manifest(kind, Transport::Http)).unwrap();
            assert_eq!(adapter.describe().runtime_kind, kind);
        }
    }

    #[test]
    fn factory_maps_local_to_mock() {
        let factory = HttpAdapterFactory::new();
        let adapter = factory
            .adapter_for(&manifest(RuntimeKind::Native, Transport::Local))
            .unwrap();
        assert_eq!(adapter.describe().agent_id, "a");
    }

    #[test]
    fn factory_rejects_stdio() {
        let factory = HttpAdapterFactory::new();
        let err = factory
            .adapter_for(&manifest(RuntimeKind::Native, Transport::Stdio))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AgentOffline);
    }
}
