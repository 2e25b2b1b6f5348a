// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workspace-level end-to-end scenarios across the gateway core.

use fabric_adapters::HttpAdapterFactory;
use fabric_auth::Verifier;
use fabric_bus::MessageBus;
use fabric_core::{
    AgentManifest, AgentStatus, CallRequest, CapabilityDescriptor, EndpointSpec, RuntimeKind,
    Transport,
};
use fabric_pipeline::Gateway;
use fabric_registry::{AgentRegistry, FileStorage};
use fabric_tools::{SafetyPolicy, ToolHost};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn manifest(id: &str, capability: &str) -> AgentManifest {
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
        capabilities: vec![CapabilityDescriptor::named(capability)],
        tags: Default::default(),
        trust_tier: Default::default(),
        status: AgentStatus::Online,
        last_seen_at: None,
        extra: BTreeMap::new(),
    }
}

fn gateway_over(registry: AgentRegistry, horizon: Duration) -> Gateway {
    Gateway::new(
        registry,
        ToolHost::with_builtins(SafetyPolicy::rooted_at(".")),
        MessageBus::new(horizon),
        Arc::new(HttpAdapterFactory::new()),
        Verifier::new(None),
    )
}

async fn call(gw: &Gateway, name: &str, arguments: serde_json::Value) -> serde_json::Value {
    let outcome = gw.handle_local(CallRequest::new(name, arguments)).await;
    serde_json::to_value(outcome.into_response()).unwrap()
}

#[tokio::test]
async fn durable_registry_survives_gateway_restart() {
    let data_dir = tempfile::tempdir().unwrap();

    {
        let registry = AgentRegistry::new(Arc::new(FileStorage::open(data_dir.path()).unwrap()));
        let gw = gateway_over(registry, Duration::from_secs(30));
        let resp = call(
            &gw,
            "fabric.agent.register",
            serde_json::json!({"agent": manifest("persistent", "reason")}),
        )
        .await;
        assert_eq!(resp["ok"], true);
    }

    // A fresh gateway over the same data dir sees the agent.
    let registry = AgentRegistry::new(Arc::new(FileStorage::open(data_dir.path()).unwrap()));
    let gw = gateway_over(registry, Duration::from_secs(30));
    let resp = call(
        &gw,
        "fabric.agent.describe",
        serde_json::json!({"agent_id": "persistent"}),
    )
    .await;
    assert_eq!(resp["result"]["agent"]["agent_id"], "persistent");

    // Call audit logs were appended for both calls.
    let logs = std::fs::read_to_string(data_dir.path().join("call_logs.jsonl")).unwrap();
    assert!(logs.lines().count() >= 2);
}

#[tokio::test]
async fn unacked_messages_redeliver_after_the_horizon() {
    let gw = gateway_over(AgentRegistry::in_memory(), Duration::from_millis(80));

    call(
        &gw,
        "fabric.message.send",
        serde_json::json!({
            "to_agent": "worker",
            "from_agent": "boss",
            "message_type": "task",
            "payload": {"step": 1},
        }),
    )
    .await;

    // First delivery, never acknowledged.
    let first = call(
        &gw,
        "fabric.message.receive",
        serde_json::json!({"agent_id": "worker", "count": 1}),
    )
    .await;
    assert_eq!(first["result"]["count"], 1);
    let first_id = first["result"]["messages"][0]["stream_entry_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Inside the horizon nothing comes back.
    let inside = call(
        &gw,
        "fabric.message.receive",
        serde_json::json!({"agent_id": "worker", "count": 1}),
    )
    .await;
    assert_eq!(inside["result"]["count"], 0);

    tokio::time::sleep(Duration::from_millis(120)).await;

    // Past the horizon the same entry is claimed again; nothing is lost.
    let reclaimed = call(
        &gw,
        "fabric.message.receive",
        serde_json::json!({"agent_id": "worker", "count": 1}),
    )
    .await;
    assert_eq!(reclaimed["result"]["count"], 1);
    assert_eq!(
        reclaimed["result"]["messages"][0]["stream_entry_id"],
        serde_json::json!(first_id)
    );
}

#[tokio::test]
async fn inbox_ordering_is_preserved_for_one_consumer() {
    let gw = gateway_over(AgentRegistry::in_memory(), Duration::from_secs(30));

    for step in 1..=3 {
        call(
            &gw,
            "fabric.message.send",
            serde_json::json!({
                "to_agent": "worker",
                "from_agent": "boss",
                "message_type": "task",
                "payload": {"step": step},
            }),
        )
        .await;
    }

    let batch = call(
        &gw,
        "fabric.message.receive",
        serde_json::json!({"agent_id": "worker", "count": 10}),
    )
    .await;
    let steps: Vec<i64> = batch["result"]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["payload"]["step"].as_i64().unwrap())
        .collect();
    assert_eq!(steps, vec![1, 2, 3]);
}

#[tokio::test]
async fn acknowledged_ids_accept_message_id_alias() {
    let gw = gateway_over(AgentRegistry::in_memory(), Duration::from_secs(30));

    let sent = call(
        &gw,
        "fabric.message.send",
        serde_json::json!({
            "to_agent": "worker",
            "from_agent": "boss",
            "message_type": "task",
            "payload": null,
        }),
    )
    .await;
    let message_id = sent["result"]["message_id"].as_str().unwrap().to_string();

    call(
        &gw,
        "fabric.message.receive",
        serde_json::json!({"agent_id": "worker", "count": 1}),
    )
    .await;

    // The user-facing message id works as an acknowledgment alias.
    let acked = call(
        &gw,
        "fabric.message.acknowledge",
        serde_json::json!({"agent_id": "worker", "message_ids": [message_id]}),
    )
    .await;
    assert_eq!(acked["result"]["acknowledged"][0]["acked"], true);

    let status = call(
        &gw,
        "fabric.message.queue_status",
        serde_json::json!({"agent_id": "worker"}),
    )
    .await;
    assert_eq!(status["result"]["queue_depth"], 0);
}

#[tokio::test]
async fn tool_surface_is_fully_callable() {
    let gw = gateway_over(AgentRegistry::in_memory(), Duration::from_secs(30));

    // Every listed (tool, capability) pair can be described.
    let listed = call(&gw, "fabric.tool.list", serde_json::json!({})).await;
    let tools = listed["result"]["tools"].as_array().unwrap().clone();
    assert!(!tools.is_empty());

    for tool in &tools {
        let tool_id = tool["tool_id"].as_str().unwrap();
        let described = call(
            &gw,
            "fabric.tool.describe",
            serde_json::json!({"tool_id": tool_id}),
        )
        .await;
        assert_eq!(described["ok"], true, "describe failed for {tool_id}");
    }

    // Spot-check a few capabilities with minimally valid parameters.
    let cases = [
        ("encode.base64", "encode", serde_json::json!({"data": "x"})),
        ("text.transform", "case", serde_json::json!({"text": "x", "mode": "upper"})),
        ("data.json", "format", serde_json::json!({"json": "{}"})),
        ("text.markdown", "render", serde_json::json!({"markdown": "# hi"})),
    ];
    for (tool_id, capability, parameters) in cases {
        let resp = call(
            &gw,
            "fabric.tool.call",
            serde_json::json!({
                "tool_id": tool_id,
                "capability": capability,
                "parameters": parameters,
            }),
        )
        .await;
        assert_eq!(resp["ok"], true, "{tool_id}.{capability} failed: {resp}");
    }
}

#[tokio::test]
async fn health_reflects_registered_runtimes() {
    let gw = gateway_over(AgentRegistry::in_memory(), Duration::from_secs(30));
    gw.registry().register(manifest("a", "reason")).unwrap();
    gw.registry().register(manifest("b", "reason")).unwrap();
    gw.registry()
        .update_status("b", AgentStatus::Offline, chrono::Utc::now())
        .unwrap();

    let resp = call(&gw, "fabric.health", serde_json::json!({})).await;
    assert_eq!(resp["result"]["runtimes"]["online"], 1);
    assert_eq!(resp["result"]["runtimes"]["offline"], 1);
}
