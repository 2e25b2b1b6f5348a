// SPDX-License-Identifier: MIT OR Apache-2.0
//! The agent-zero style dialect.
//!
//! Request: `POST {endpoint} {"action_name": <capability>, "params": {...},
//! "trace_id": "<uuid>"}`. Sync response: `{"success": bool, "data": ...}`
//! or `{"success": false, "error": "<text>"}`. Streamed responses use
//! `data:` lines of `{"event": "status"|"chunk"|"action"|"progress"|"done",
//! ...}` which this adapter maps back to canonical events.

use crate::http;
use crate::{EventStream, RuntimeAdapter};
use async_trait::async_trait;
use fabric_core::stream::StreamEventKind;
use fabric_core::{AgentManifest, AgentStatus, CanonicalEnvelope, StreamEvent};
use fabric_error::{ErrorBody, ErrorCode, GatewayError};

/// Adapter for agent-zero style agents.
pub struct ZeroStyleAdapter {
    client: reqwest::Client,
    manifest: AgentManifest,
}

impl ZeroStyleAdapter {
    /// Create an adapter over the given client and manifest snapshot.
    #[must_use]
    pub fn new(client: reqwest::Client, manifest: AgentManifest) -> Self {
        Self { client, manifest }
    }

    fn request_body(&self, envelope: &CanonicalEnvelope) -> serde_json::Value {
        let mut params = serde_json::Map::new();
        if let Some(ref task) = envelope.input.task {
            params.insert("message".into(), serde_json::Value::String(task.clone()));
        }
        if let Some(ref context) = envelope.input.context {
            params.insert("context".into(), context.clone());
        }
        if let Some(ref parameters) = envelope.input.parameters {
            params.insert("extra".into(), parameters.clone());
        }

        serde_json::json!({
            "action_name": envelope.target.capability,
            "params": params,
            "trace_id": envelope.trace.trace_id,
        })
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
impl RuntimeAdapter for ZeroStyleAdapter {
    async fn call(&self, envelope: &CanonicalEnvelope) -> Result<serde_json::Value, GatewayError> {
        let body = self.request_body(envelope);
        let response = http::post_json(
            &self.client,
            &self.manifest.endpoint.uri,
            &body,
            self.deadline(envelope),
        )
        .await?;

        interpret_zero_response(response)
    }

    async fn call_stream(&self, envelope: &CanonicalEnvelope) -> Result<EventStream, GatewayError> {
        let body = self.request_body(envelope);
        http::post_stream(
            &self.client,
            &self.manifest.endpoint.uri,
            &body,
            self.deadline(envelope),
            envelope.trace,
            map_zero_event,
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

/// Interpret a zero-style `{success, data | error}` body.
fn interpret_zero_response(response: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
    match response.get("success").and_then(serde_json::Value::as_bool) {
        Some(true) => Ok(response
            .get("data")
            .cloned()
            .unwrap_or(serde_json::Value::Null)),
        Some(false) => {
            let message = response
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("agent reported a failure");
            Err(GatewayError::new(ErrorCode::UpstreamError, message.to_string()))
        }
        None => Err(GatewayError::new(
            ErrorCode::UpstreamError,
            "upstream response missing 'success' discriminator",
        )),
    }
}

/// Map one foreign `{"event": ...}` payload into a canonical event.
fn map_zero_event(payload: serde_json::Value) -> Option<StreamEvent> {
    let event = payload.get("event").and_then(serde_json::Value::as_str)?;
    match event {
        "status" => Some(StreamEvent::status(
            payload
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default(),
        )),
        "chunk" => Some(StreamEvent::token(
            payload
                .get("text")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default(),
        )),
        "action" => Some(StreamEvent {
            trace: None,
            kind: StreamEventKind::ToolCall {
                tool_name: payload
                    .get("action")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                input: payload.get("input").cloned().unwrap_or(serde_json::Value::Null),
            },
        }),
        "progress" => Some(StreamEvent {
            trace: None,
            kind: StreamEventKind::Progress {
                fraction: payload.get("fraction").and_then(serde_json::Value::as_f64),
                message: payload
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
        }),
        "done" => {
            let kind = if payload
                .get("success")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(true)
            {
                StreamEventKind::Final {
                    ok: true,
                    result: Some(payload.get("data").cloned().unwrap_or(serde_json::Value::Null)),
                    error: None,
                }
            } else {
                let message = payload
                    .get("error")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("agent reported a failure");
                StreamEventKind::Final {
                    ok: false,
                    result: None,
                    error: Some(ErrorBody::from(GatewayError::new(
                        ErrorCode::UpstreamError,
                        message.to_string(),
                    ))),
                }
            };
            Some(StreamEvent { trace: None, kind })
        }
        _ => None,
    }
}
