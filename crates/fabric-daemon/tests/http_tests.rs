// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP front tests driven through the router in-process.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use fabric_adapters::HttpAdapterFactory;
use fabric_auth::Verifier;
use fabric_bus::MessageBus;
use fabric_core::{
    AgentManifest, AgentStatus, CapabilityDescriptor, EndpointSpec, RuntimeKind, Transport,
};
use fabric_daemon::{AppState, build_app};
use fabric_pipeline::Gateway;
use fabric_registry::AgentRegistry;
use fabric_tools::{SafetyPolicy, ToolHost};
use http_body_util::BodyExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn manifest(id: &str, capability: &str, streaming: bool) -> AgentManifest {
    AgentManifest {
        agent_id: id.into(),
        display_name: id.to_uppercase(),
        version: "1.0".into(),
        description: String::new(),
        runtime_kind: RuntimeKind::Native,
        endpoint: EndpointSpec {
            transport: Transport::Local,
            uri: format!("local:{id}"),
        },
        capabilities: vec![CapabilityDescriptor::named(capability).streaming(streaming)],
        tags: Default::default(),
        trust_tier: Default::default(),
        status: AgentStatus::Online,
        last_seen_at: None,
        extra: BTreeMap::new(),
    }
}

fn app(secret: Option<&str>) -> (axum::Router, Gateway) {
    let gateway = Gateway::new(
        AgentRegistry::in_memory(),
        ToolHost::with_builtins(SafetyPolicy::rooted_at(".")),
        MessageBus::new(Duration::from_secs(30)),
        Arc::new(HttpAdapterFactory::new()),
        Verifier::new(secret.map(String::from)),
    );
    let router = build_app(Arc::new(AppState {
        gateway: gateway.clone(),
    }));
    (router, gateway)
}

fn call_body(name: &str, arguments: serde_json::Value) -> Body {
    Body::from(serde_json::json!({"name": name, "arguments": arguments}).to_string())
}

async fn json_of(resp: axum::response::Response) -> serde_json::Value {
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_live() {
    let (app, _) = app(None);
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key(fabric_daemon::middleware::REQUEST_ID_HEADER));
    let json = json_of(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], fabric_core::PROTOCOL_VERSION);
}

#[tokio::test]
async fn wrong_bearer_is_401_with_envelope() {
    let (app, _) = app(Some("s3cret"));
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp/call")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(call_body("fabric.health", serde_json::json!({})))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json = json_of(resp).await;
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "AUTH_DENIED");
    assert!(json["trace"]["trace_id"].is_string());
}

#[tokio::test]
async fn missing_bearer_is_401() {
    let (app, _) = app(Some("s3cret"));
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp/call")
                .header(header::CONTENT_TYPE, "application/json")
                .body(call_body("fabric.health", serde_json::json!({})))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn call_round_trip_with_correct_bearer() {
    let (app, gateway) = app(Some("s3cret"));
    gateway.registry().register(manifest("echoer", "echo", false)).unwrap();

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp/call")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, "Bearer s3cret")
                .body(call_body(
                    "fabric.call",
                    serde_json::json!({"agent_id": "echoer", "capability": "echo", "task": "hi"}),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_of(resp).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["result"]["echo"], "hi");
}

#[tokio::test]
async fn error_codes_map_to_http_status() {
    let (app, _) = app(None);
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp/call")
                .header(header::CONTENT_TYPE, "application/json")
                .body(call_body(
                    "fabric.call",
                    serde_json::json!({"agent_id": "ghost", "capability": "x", "task": "t"}),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json = json_of(resp).await;
    assert_eq!(json["error"]["code"], "AGENT_NOT_FOUND");
}

#[tokio::test]
async fn streaming_call_uses_event_stream_framing() {
    let (app, gateway) = app(None);
    gateway
        .registry()
        .register(manifest("narrator", "narrate", true))
        .unwrap();

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp/call")
                .header(header::CONTENT_TYPE, "application/json")
                .body(call_body(
                    "fabric.call",
                    serde_json::json!({
                        "agent_id": "narrator",
                        "capability": "narrate",
                        "task": "one two",
                        "stream": true,
                    }),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let events: Vec<serde_json::Value> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(events.len() >= 2);
    assert_eq!(events.last().unwrap()["kind"], "final");
    assert_eq!(events.last().unwrap()["ok"], true);
}

#[tokio::test]
async fn rest_wrappers_synthesize_fabric_calls() {
    let (app, _) = app(None);

    // Register through REST.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp/register_agent")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_string(&manifest("rest-agent", "reason", false)).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_of(resp).await["result"]["registered"], true);

    // List and fetch it back.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/mcp/list_agents?status=online")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = json_of(resp).await;
    assert_eq!(json["result"]["agents"][0]["agent_id"], "rest-agent");

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/mcp/agent/rest-agent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_of(resp).await["result"]["agent"]["agent_id"], "rest-agent");

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/mcp/list_tools?category=math")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = json_of(resp).await;
    assert_eq!(json["result"]["count"], 1);
}

#[tokio::test]
async fn metrics_and_topics_endpoints() {
    let (app, gateway) = app(None);
    let _sub = gateway.bus().topics().subscribe("shared:x");

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/mcp/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = json_of(resp).await;
    assert!(json["metrics"]["calls_total"].is_u64());

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/mcp/list_topics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = json_of(resp).await;
    assert_eq!(json["topics"][0]["topic"], "shared:x");
}
