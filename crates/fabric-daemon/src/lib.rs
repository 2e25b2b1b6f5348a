// SPDX-License-Identifier: MIT OR Apache-2.0
//! fabric-daemon
//!
//! The transport fronts: an HTTP front (axum) and a line-delimited JSON
//! front over the process's standard streams. Both share one [`Gateway`].

#![deny(unsafe_code)]

/// Per-request bookkeeping middleware.
pub mod middleware;
/// Line-delimited JSON front.
pub mod stdio;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path as AxPath, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use fabric_core::{CallRequest, PROTOCOL_VERSION, StreamEvent};
use fabric_pipeline::{CallOutcome, Gateway};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;

/// Shared state behind every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    /// The request pipeline.
    pub gateway: Gateway,
}

/// Build the axum router with all gateway routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/mcp/call", post(cmd_call))
        .route("/mcp/list_agents", get(cmd_list_agents))
        .route("/mcp/register_agent", post(cmd_register_agent))
        .route("/mcp/agent/{id}", get(cmd_get_agent))
        .route("/mcp/list_tools", get(cmd_list_tools))
        .route("/mcp/list_topics", get(cmd_list_topics))
        .route("/mcp/metrics", get(cmd_metrics))
        .layer(axum::middleware::from_fn(middleware::track_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Render a pipeline outcome as an HTTP response.
///
/// Sync envelopes map the error code to an HTTP status (the body is always
/// the canonical envelope); streams become `text/event-stream` frames, one
/// `data: <json>` per event.
fn render(outcome: CallOutcome) -> Response {
    match outcome {
        CallOutcome::Response(envelope) => {
            let status = match &envelope.error {
                None => StatusCode::OK,
                Some(e) => {
                    StatusCode::from_u16(e.code.http_status()).unwrap_or(StatusCode::BAD_GATEWAY)
                }
            };
            (status, Json(envelope)).into_response()
        }
        CallOutcome::Stream(stream) => {
            let frames = stream.map(|event: StreamEvent| {
                Ok::<_, Infallible>(
                    SseEvent::default()
                        .data(serde_json::to_string(&event).unwrap_or_else(|_| "{}".into())),
                )
            });
            Sse::new(frames).into_response()
        }
    }
}

async fn cmd_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": PROTOCOL_VERSION,
    }))
}

async fn cmd_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let outcome = state.gateway.handle_raw(&body, bearer(&headers).as_deref()).await;
    render(outcome)
}

/// Thin wrapper: synthesize the equivalent `fabric.*` call.
async fn synthesize(
    state: &AppState,
    headers: &HeaderMap,
    name: &str,
    arguments: serde_json::Value,
) -> Response {
    let outcome = state
        .gateway
        .handle(CallRequest::new(name, arguments), bearer(headers).as_deref())
        .await;
    render(outcome)
}

async fn cmd_list_agents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut filter = serde_json::Map::new();
    for key in ["capability", "tag", "status"] {
        if let Some(value) = params.get(key) {
            filter.insert(key.into(), serde_json::json!(value));
        }
    }
    synthesize(
        &state,
        &headers,
        "fabric.agent.list",
        serde_json::json!({"filter": filter}),
    )
    .await
}

async fn cmd_register_agent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(manifest): Json<serde_json::Value>,
) -> Response {
    synthesize(
        &state,
        &headers,
        "fabric.agent.register",
        serde_json::json!({"agent": manifest}),
    )
    .await
}

async fn cmd_get_agent(
    State(state): State<Arc<AppState>>,
    AxPath(id): AxPath<String>,
    headers: HeaderMap,
) -> Response {
    synthesize(
        &state,
        &headers,
        "fabric.agent.describe",
        serde_json::json!({"agent_id": id}),
    )
    .await
}

async fn cmd_list_tools(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut arguments = serde_json::Map::new();
    for key in ["category", "provider"] {
        if let Some(value) = params.get(key) {
            arguments.insert(key.into(), serde_json::json!(value));
        }
    }
    synthesize(
        &state,
        &headers,
        "fabric.tool.list",
        serde_json::Value::Object(arguments),
    )
    .await
}

async fn cmd_list_topics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let topics: Vec<serde_json::Value> = state
        .gateway
        .bus()
        .topics()
        .list()
        .into_iter()
        .map(|(name, subscribers)| serde_json::json!({"topic": name, "subscribers": subscribers}))
        .collect();
    Json(serde_json::json!({"topics": topics}))
}

async fn cmd_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({"metrics": state.gateway.metrics()}))
}
