// SPDX-License-Identifier: MIT OR Apache-2.0
//! The gateway's native dialect.
//!
//! Request: `POST {endpoint} {"name": <capability>, "arguments": <input>}`.
//! Sync response: `{"ok": bool, "result": ..., "error": {...}}`.
//! Streamed response: canonical `data: <StreamEvent>` lines.

use crate::http;
use crate::{EventStream, RuntimeAdapter};
use async_trait::async_trait;
use fabric_core::{AgentManifest, AgentStatus, CanonicalEnvelope, StreamEvent};
use fabric_error::{ErrorCode, GatewayError};

/// Adapter for agents speaking the gateway's own protocol.
pub struct NativeAdapter {
    client: reqwest::Client,
    manifest: AgentManifest,
}

impl NativeAdapter {
    /// Create an adapter over the given client and manifest snapshot.
    #[must_use]
    pub fn new(client: reqwest::Client, manifest: AgentManifest) -> Self {
        Self { client, manifest }
    }

    fn request_body(&self, envelope: &CanonicalEnvelope) -> serde_json::Value {
        serde_json::json!({
            "name": envelope.target.capability,
            "arguments": {
                "task": envelope.input.task,
                "context": envelope.input.context,
                "attachments": envelope.input.attachments,
                "parameters": envelope.input.parameters,
                "trace_id": envelope.trace.trace_id,
            },
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
impl RuntimeAdapter for NativeAdapter {
    async fn call(&self, envelope: &CanonicalEnvelope) -> Result<serde_json::Value, GatewayError> {
        let body = self.request_body(envelope);
        let response = http::post_json(
            &self.client,
            &self.manifest.endpoint.uri,
            &body,
            self.deadline(envelope),
        )
        .await?;

        interpret_native_response(response)
    }

    async fn call_stream(&self, envelope: &CanonicalEnvelope) -> Result<EventStream, GatewayError> {
        let body = self.request_body(envelope);
        http::post_stream(
            &self.client,
            &self.manifest.endpoint.uri,
            &body,
            self.deadline(envelope),
            envelope.trace,
            // Native agents emit canonical events already.
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

/// Interpret a native `{ok, result | error}` body.
fn interpret_native_response(response: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
    match response.get("ok").and_then(serde_json::Value::as_bool) {
        Some(true) => Ok(response
            .get("result")
            .cloned()
            .unwrap_or(serde_json::Value::Null)),
        Some(false) => {
            let message = response
                .pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("agent reported a failure");
            let mut err = GatewayError::new(ErrorCode::UpstreamError, message.to_string());
            if let Some(code) = response.pointer("/error/code").and_then(serde_json::Value::as_str)
            {
                err = err.with_detail("agent_code", code);
            }
            Err(err)
        }
        None => Err(GatewayError::new(
            ErrorCode::UpstreamError,
            "upstream response missing 'ok' discriminator",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::{
        AuthContext, CallInput, CapabilityDescriptor, EndpointSpec, ResponseSpec, RuntimeKind,
        TargetKind, TargetSpec, TraceContext, Transport,
    };
    use tokio_stream::StreamExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manifest(uri: &str) -> AgentManifest {
        AgentManifest {
            agent_id: "native-1".into(),
            display_name: "Native".into(),
            version: "1.0".into(),
            description: String::new(),
            runtime_kind: RuntimeKind::Native,
            endpoint: EndpointSpec {
                transport: Transport::Http,
                uri: uri.into(),
            },
            capabilities: vec![
                CapabilityDescriptor::named("reason"),
                CapabilityDescriptor::named("narrate").streaming(true),
            ],
            tags: Default::default(),
            trust_tier: Default::default(),
            status: AgentStatus::Online,
            last_seen_at: None,
            extra: Default::default(),
        }
    }

    fn envelope(capability: &str, timeout_ms: Option<u64>) -> CanonicalEnvelope {
        CanonicalEnvelope {
            trace: TraceContext::root(),
            auth: AuthContext::local(),
            target: TargetSpec {
                kind: TargetKind::Agent,
                id: "native-1".into(),
                capability: capability.into(),
                timeout_ms,
            },
            input: CallInput {
                task: Some("do the thing".into()),
                ..Default::default()
            },
            response: ResponseSpec::default(),
        }
    }

    #[tokio::test]
    async fn call_posts_name_and_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(serde_json::json!({"name": "reason"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"answer": 42},
            })))
            .mount(&server)
            .await;

        let adapter = NativeAdapter::new(reqwest::Client::new(), manifest(&server.uri()));
        let result = adapter.call(&envelope("reason", None)).await.unwrap();
        assert_eq!(result["answer"], 42);
    }

    #[tokio::test]
    async fn agent_failure_maps_to_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false,
                "error": {"code": "E_NO_GPU", "message": "no accelerator"},
            })))
            .mount(&server)
            .await;

        let adapter = NativeAdapter::new(reqwest::Client::new(), manifest(&server.uri()));
        let err = adapter.call(&envelope("reason", None)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UpstreamError);
        assert_eq!(err.details["agent_code"], serde_json::json!("E_NO_GPU"));
    }

    #[tokio::test]
    async fn http_error_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let adapter = NativeAdapter::new(reqwest::Client::new(), manifest(&server.uri()));
        let err = adapter.call(&envelope("reason", None)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UpstreamError);
        // Raw upstream body text never reaches the message.
        assert!(!err.message.contains("boom"));
    }

    #[tokio::test]
    async fn slow_agent_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": true, "result": null}))
                    .set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let adapter = NativeAdapter::new(reqwest::Client::new(), manifest(&server.uri()));
        let err = adapter.call(&envelope("reason", Some(50))).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn unreachable_agent_is_offline() {
        // Nothing listens on this port.
        let adapter = NativeAdapter::new(reqwest::Client::new(), manifest("http://127.0.0.1:9"));
        let err = adapter.call(&envelope("reason", Some(2000))).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AgentOffline);
    }

    #[tokio::test]
    async fn stream_forwards_events_and_terminates() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"kind\":\"status\",\"message\":\"accepted\"}\n\n",
            "data: {\"kind\":\"token\",\"text\":\"hel\"}\n\n",
            "data: {\"kind\":\"token\",\"text\":\"lo\"}\n\n",
            "data: {\"kind\":\"final\",\"ok\":true,\"result\":{\"text\":\"hello\"}}\n\n",
            "data: {\"kind\":\"token\",\"text\":\"dropped\"}\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let adapter = NativeAdapter::new(reqwest::Client::new(), manifest(&server.uri()));
        let stream = adapter.call_stream(&envelope("narrate", None)).await.unwrap();
        let events: Vec<StreamEvent> = stream.collect().await;

        assert_eq!(events.len(), 4, "events after final must be dropped");
        assert!(events.last().unwrap().is_terminal());
        assert!(events.last().unwrap().trace.is_some());
    }

    #[tokio::test]
    async fn stream_without_final_synthesizes_error_terminal() {
        let server = MockServer::start().await;
        let sse = "data: {\"kind\":\"token\",\"text\":\"partial\"}\n\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let adapter = NativeAdapter::new(reqwest::Client::new(), manifest(&server.uri()));
        let stream = adapter.call_stream(&envelope("narrate", None)).await.unwrap();
        let events: Vec<StreamEvent> = stream.collect().await;

        let last = events.last().unwrap();
        assert!(last.is_terminal());
        let json = serde_json::to_value(last).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"]["code"], "UPSTREAM_ERROR");
    }

    #[tokio::test]
    async fn probe_health_checks_health_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let adapter = NativeAdapter::new(reqwest::Client::new(), manifest(&server.uri()));
        assert_eq!(adapter.probe_health().await, AgentStatus::Online);

        let dead = NativeAdapter::new(reqwest::Client::new(), manifest("http://127.0.0.1:9"));
        assert_eq!(dead.probe_health().await, AgentStatus::Offline);
    }
}
