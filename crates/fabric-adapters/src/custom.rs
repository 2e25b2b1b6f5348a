// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-agent custom HTTP dialect.
//!
//! Default request: `POST {endpoint} {"capability": ..., "input": {...},
//! "trace_id": "<uuid>"}`. Agents can rename the request fields through
//! manifest `extra` keys:
//!
//! ```toml
//! [agents.request_shape]
//! capability_key = "op"
//! input_key = "args"
//! ```
//!
//! The response is interpreted as `{ok, result | error}` when that shape is
//! present, otherwise the whole body is the result.

use crate::http;
use crate::{EventStream, RuntimeAdapter};
use async_trait::async_trait;
use fabric_core::{AgentManifest, AgentStatus, CanonicalEnvelope, StreamEvent};
use fabric_error::GatewayError;

/// Adapter for agents with a bespoke HTTP shape.
pub struct CustomHttpAdapter {
    client: reqwest::Client,
    manifest: AgentManifest,
    capability_key: String,
    input_key: String,
}

impl CustomHttpAdapter {
    /// Create an adapter over the given client and manifest snapshot.
    ///
    /// Field names come from the manifest's `request_shape` extra block
    /// when present.
    #[must_use]
    pub fn new(client: reqwest::Client, manifest: AgentManifest) -> Self {
        let shape = manifest.extra.get("request_shape");
        let key = |name: &str, default: &str| -> String {
            shape
                .and_then(|s| s.get(name))
                .and_then(serde_json::Value::as_str)
                .unwrap_or(default)
                .to_string()
        };
        let capability_key = key("capability_key", "capability");
        let input_key = key("input_key", "input");
        Self {
            client,
            manifest,
            capability_key,
            input_key,
        }
    }

    fn request_body(&self, envelope: &CanonicalEnvelope) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        body.insert(
            self.capability_key.clone(),
            serde_json::Value::String(envelope.target.capability.clone()),
        );
        body.insert(
            self.input_key.clone(),
            serde_json::to_value(&envelope.input).unwrap_or(serde_json::Value::Null),
        );
        body.insert(
            "trace_id".into(),
            serde_json::Value::String(envelope.trace.trace_id.to_string()),
        );
        serde_json::Value::Object(body)
    }

    fn deadline(&self, envelope: &CanonicalEnvelope) -> std::time::Duration {
        let cap_max = self
            .manifest
            .capability(&envelope.target.capability)
            .map(|c| c.max_timeout_ms);
        envelope.deadline(cap_max)
    }
}

#[async_trait]
impl RuntimeAdapter for CustomHttpAdapter {
    async fn call(&self, envelope: &CanonicalEnvelope) -> Result<serde_json::Value, GatewayError> {
        let body = self.request_body(envelope);
        let response = http::post_json(
            &self.client,
            &self.manifest.endpoint.uri,
            &body,
            self.deadline(envelope),
        )
        .await?;

        // `{ok, result | error}` when the agent opted into the canonical
        // shape; otherwise the entire body is the result.
        if response.get("ok").and_then(serde_json::Value::as_bool).is_some() {
            let parsed: Result<fabric_core::CallResponse, _> = serde_json::from_value(response);
            return match parsed {
                Ok(resp) => resp.into_result(),
                Err(e) => Err(GatewayError::upstream(e)),
            };
        }
        Ok(response)
    }

    async fn call_stream(&self, envelope: &CanonicalEnvelope) -> Result<EventStream, GatewayError> {
        let body = self.request_body(envelope);
        http::post_stream(
            &self.client,
            &self.manifest.endpoint.uri,
            &body,
            self.deadline(envelope),
            envelope.trace,
            // Custom agents opt into canonical event framing for streams.
            |payload| serde_json::from_value::<StreamEvent>(payload).ok(),
        )
        .await
    }

    async fn probe_health(&self) -> AgentStatus {
        if http::probe_endpoint(&self.client, &self.manifest.endpoint.uri).await {
            AgentStatus::Online
        } else {
            AgentStatus::Offline
        }
    }

    fn describe(&self) -> AgentManifest {
        self.manifest.clone()
    }
}
