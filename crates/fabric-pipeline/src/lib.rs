// SPDX-License-Identifier: MIT OR Apache-2.0
//! fabric-pipeline
//!
//! The front controller. Every call passes through the same phases:
//! parse, authenticate, trace-stamp, classify, validate, envelope, resolve,
//! execute, shape. The trace context is stamped on every response, success
//! or failure, and on every log line emitted while handling the call.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Agent-capability dispatch with fallback chaining.
mod dispatch;
/// Gateway call counters.
pub mod metrics;

use chrono::Utc;
use fabric_adapters::{AdapterFactory, EventStream};
use fabric_auth::Verifier;
use fabric_bus::{Accessor, MessageBus};
use fabric_core::{
    AgentManifest, AuthContext, AuthMode, CallRequest, CallResponse, MessagePriority,
    PROTOCOL_VERSION, TraceContext, TrustTier,
};
use fabric_error::{ErrorCode, GatewayError};
use fabric_registry::{AgentRegistry, CallLogRecord, ListFilter};
use fabric_tools::{ToolFilter, ToolHost};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

pub use metrics::{GatewayMetrics, MetricsSnapshot};

/// Default number of messages a `receive` returns when unspecified.
const DEFAULT_RECEIVE_COUNT: usize = 10;

/// How a handled call is answered.
pub enum CallOutcome {
    /// A single response envelope.
    Response(CallResponse),
    /// A lazy event sequence ending in a `final` event.
    Stream(EventStream),
}

impl CallOutcome {
    /// Unwrap the sync envelope; panics on a stream (test helper).
    #[must_use]
    pub fn into_response(self) -> CallResponse {
        match self {
            Self::Response(r) => r,
            Self::Stream(_) => panic!("expected a sync response, got a stream"),
        }
    }
}

/// Everything the pipeline needs to route a call.
///
/// Cheap to clone; transport fronts share one instance.
#[derive(Clone)]
pub struct Gateway {
    registry: AgentRegistry,
    tools: ToolHost,
    bus: MessageBus,
    adapters: Arc<dyn AdapterFactory>,
    verifier: Verifier,
    metrics: Arc<GatewayMetrics>,
    started_at: Instant,
}

impl Gateway {
    /// Wire a gateway from its collaborators.
    #[must_use]
    pub fn new(
        registry: AgentRegistry,
        tools: ToolHost,
        bus: MessageBus,
        adapters: Arc<dyn AdapterFactory>,
        verifier: Verifier,
    ) -> Self {
        Self {
            registry,
            tools,
            bus,
            adapters,
            verifier,
            metrics: Arc::new(GatewayMetrics::new()),
            started_at: Instant::now(),
        }
    }

    /// The registry this gateway routes against.
    #[must_use]
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// The tool host.
    #[must_use]
    pub fn tools(&self) -> &ToolHost {
        &self.tools
    }

    /// The message bus.
    #[must_use]
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Current metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Handle a raw request body from an authenticated transport.
    ///
    /// Phase 1 (parse) happens here so malformed JSON still gets a shaped
    /// `BAD_INPUT` envelope with a trace.
    pub async fn handle_raw(&self, body: &[u8], credential: Option<&str>) -> CallOutcome {
        match serde_json::from_slice::<CallRequest>(body) {
            Ok(request) => self.handle(request, credential).await,
            Err(e) => {
                let trace = TraceContext::root();
                self.metrics.record_call();
                self.metrics.record_error();
                CallOutcome::Response(CallResponse::failure(
                    trace,
                    GatewayError::bad_input(format!("malformed request body: {e}")),
                ))
            }
        }
    }

    /// Handle a parsed request, authenticating the supplied credential.
    pub async fn handle(&self, request: CallRequest, credential: Option<&str>) -> CallOutcome {
        let trace = self.trace_for(&request);

        // Phase 2: authenticate before anything else touches the arguments.
        let auth = match self.verifier.verify(credential) {
            Ok(auth) => auth,
            Err(err) => {
                self.metrics.record_call();
                self.metrics.record_error();
                warn!(
                    target: "fabric.pipeline",
                    trace_id = %trace.trace_id,
                    span_id = %trace.span_id,
                    code = err.code.as_str(),
                    "authentication failed"
                );
                return CallOutcome::Response(CallResponse::failure(trace, err));
            }
        };

        self.handle_authenticated(request, auth, trace).await
    }

    /// Handle a request from the local front (no credential material).
    pub async fn handle_local(&self, request: CallRequest) -> CallOutcome {
        let trace = self.trace_for(&request);
        self.handle_authenticated(request, AuthContext::local(), trace)
            .await
    }

    /// Adopt a caller-supplied `trace_id` or start a fresh trace.
    fn trace_for(&self, request: &CallRequest) -> TraceContext {
        request
            .arguments
            .get("trace_id")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .map_or_else(TraceContext::root, TraceContext::adopt)
    }

    async fn handle_authenticated(
        &self,
        request: CallRequest,
        auth: AuthContext,
        trace: TraceContext,
    ) -> CallOutcome {
        // Phase 3: a per-request span carries the trace onto every log line.
        let span = info_span!(
            target: "fabric.pipeline",
            "call",
            name = %request.name,
            trace_id = %trace.trace_id,
            span_id = %trace.span_id,
        );
        self.execute_in_span(request, auth, trace).instrument(span).await
    }

    async fn execute_in_span(
        &self,
        request: CallRequest,
        auth: AuthContext,
        trace: TraceContext,
    ) -> CallOutcome {
        self.metrics.record_call();
        let started_at = Utc::now();

        let outcome = self.classify_and_execute(&request, &auth, trace).await;

        match outcome {
            Ok(CallOutcome::Stream(stream)) => {
                self.metrics.record_streamed_call();
                self.log_call(&request, trace, started_at, serde_json::json!({"streamed": true}));
                CallOutcome::Stream(stream)
            }
            Ok(CallOutcome::Response(response)) => {
                if !response.ok {
                    self.metrics.record_error();
                }
                self.log_call(
                    &request,
                    trace,
                    started_at,
                    serde_json::json!({
                        "ok": response.ok,
                        "error": response.error.as_ref().map(|e| e.code),
                    }),
                );
                CallOutcome::Response(response)
            }
            Err(err) => {
                self.metrics.record_error();
                info!(
                    target: "fabric.pipeline",
                    code = err.code.as_str(),
                    error = %err,
                    "call failed"
                );
                self.log_call(
                    &request,
                    trace,
                    started_at,
                    serde_json::json!({"ok": false, "error": err.code}),
                );
                CallOutcome::Response(CallResponse::failure(trace, err))
            }
        }
    }

    /// Phases 4–8: classify the name, validate arguments, and execute.
    async fn classify_and_execute(
        &self,
        request: &CallRequest,
        auth: &AuthContext,
        trace: TraceContext,
    ) -> Result<CallOutcome, GatewayError> {
        let args = &request.arguments;
        let sync = |result: serde_json::Value| {
            Ok(CallOutcome::Response(CallResponse::success(trace, result)))
        };

        match request.name.as_str() {
            "fabric.health" => sync(self.health_snapshot()),

            "fabric.agent.list" => sync(self.agent_list(args)),
            "fabric.agent.describe" => {
                let agent_id = required_str(args, "agent_id")?;
                let agent = self.registry.require(agent_id)?;
                sync(serde_json::json!({"agent": agent}))
            }
            "fabric.agent.register" => {
                let manifest: AgentManifest =
                    serde_json::from_value(required_field(args, "agent")?.clone())
                        .map_err(|e| GatewayError::bad_input(format!("invalid manifest: {e}")))?;
                let agent_id = manifest.agent_id.clone();
                self.registry.register(manifest)?;
                sync(serde_json::json!({"agent_id": agent_id, "registered": true}))
            }
            "fabric.agent.deregister" => {
                let agent_id = required_str(args, "agent_id")?;
                self.registry.deregister(agent_id)?;
                sync(serde_json::json!({"agent_id": agent_id, "deregistered": true}))
            }

            "fabric.route.preview" => sync(self.route_preview(args)?),

            "fabric.call" => {
                self.metrics.record_agent_call();
                self.dispatch_agent(args, auth, trace).await
            }

            "fabric.tool.list" => sync(self.tool_list(args)),
            "fabric.tool.describe" => {
                let tool_id = required_str(args, "tool_id")?;
                sync(serde_json::json!({"tool": self.tools.describe(tool_id)?}))
            }
            "fabric.tool.call" => {
                self.metrics.record_tool_call();
                let tool_id = required_str(args, "tool_id")?;
                let capability = required_str(args, "capability")?;
                let params = required_field(args, "parameters")?;
                let result = self
                    .tools
                    .execute(tool_id, capability, params, caller_tier(auth))
                    .await?;
                sync(result)
            }

            name if name.starts_with("fabric.message.") => {
                self.metrics.record_bus_operation();
                let result = self.dispatch_message(name, args, auth).await?;
                sync(result)
            }

            // `fabric.tool.{category}.{name}` aliases resolve to the dotted
            // tool id with the capability taken from the arguments (or the
            // tool's sole capability).
            name if name.starts_with("fabric.tool.") => {
                self.metrics.record_tool_call();
                let tool_id = name.trim_start_matches("fabric.tool.");
                let descriptor = self.tools.describe(tool_id).map_err(|_| {
                    GatewayError::bad_input(format!("unknown tool: {}", request.name))
                })?;
                let capability = match args.get("capability").and_then(serde_json::Value::as_str) {
                    Some(c) => c.to_string(),
                    None if descriptor.capabilities.len() == 1 => descriptor
                        .capabilities
                        .keys()
                        .next()
                        .cloned()
                        .unwrap_or_default(),
                    None => {
                        return Err(GatewayError::bad_input(format!(
                            "tool '{tool_id}' has multiple capabilities; 'capability' is required"
                        )));
                    }
                };
                let params = args
                    .get("parameters")
                    .cloned()
                    .unwrap_or_else(|| args.clone());
                let result = self
                    .tools
                    .execute(tool_id, &capability, &params, caller_tier(auth))
                    .await?;
                sync(result)
            }

            _ => Err(GatewayError::bad_input("unknown tool")
                .with_detail("name", request.name.clone())),
        }
    }

    // -- Registry reads ------------------------------------------------------

    fn health_snapshot(&self) -> serde_json::Value {
        let (online, degraded, offline, _unknown) = self.registry.status_counts();
        serde_json::json!({
            "ok": true,
            "registry": "ok",
            "runtimes": {"online": online, "degraded": degraded, "offline": offline},
            "version": PROTOCOL_VERSION,
            "uptime_seconds": self.started_at.elapsed().as_secs(),
        })
    }

    fn agent_list(&self, args: &serde_json::Value) -> serde_json::Value {
        let filter = args.get("filter").map_or_else(ListFilter::default, |f| ListFilter {
            capability: f
                .get("capability")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            tag: f.get("tag").and_then(serde_json::Value::as_str).map(String::from),
            status: f
                .get("status")
                .and_then(|s| serde_json::from_value(s.clone()).ok()),
        });
        serde_json::json!({"agents": self.registry.list(&filter)})
    }

    fn route_preview(&self, args: &serde_json::Value) -> Result<serde_json::Value, GatewayError> {
        let agent_id = required_str(args, "agent_id")?;
        let capability = required_str(args, "capability")?;

        let manifest = self.registry.require(agent_id)?;
        if !manifest.has_capability(capability) {
            return Err(capability_not_found(agent_id, capability));
        }

        let fallbacks: Vec<String> = self
            .registry
            .find_by_capability(capability)
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| id != agent_id)
            .collect();

        Ok(serde_json::json!({
            "selected_runtime": manifest.runtime_kind,
            "policy": "explicit-agent",
            "fallbacks": fallbacks,
        }))
    }

    fn tool_list(&self, args: &serde_json::Value) -> serde_json::Value {
        let filter = ToolFilter {
            category: args
                .get("category")
                .and_then(serde_json::Value::as_str)
                .map(String::from),
            provider: args
                .get("provider")
                .and_then(|p| serde_json::from_value(p.clone()).ok()),
        };
        let tools = self.tools.list(&filter);
        let count = tools.len();
        serde_json::json!({"tools": tools, "count": count})
    }

    // -- Message bus ---------------------------------------------------------

    async fn dispatch_message(
        &self,
        name: &str,
        args: &serde_json::Value,
        auth: &AuthContext,
    ) -> Result<serde_json::Value, GatewayError> {
        let accessor = accessor_for(auth);
        match name {
            "fabric.message.send" => {
                let to_agent = required_str(args, "to_agent")?;
                let from_agent = required_str(args, "from_agent")?;
                let message_type = required_str(args, "message_type")?;
                let payload = required_field(args, "payload")?.clone();
                let priority = match args.get("priority") {
                    Some(p) => serde_json::from_value::<MessagePriority>(p.clone())
                        .map_err(|_| GatewayError::bad_input("invalid priority"))?,
                    None => MessagePriority::Normal,
                };
                let reply_to = args
                    .get("reply_to")
                    .and_then(serde_json::Value::as_str)
                    .map(String::from);

                let receipt = self
                    .bus
                    .send(from_agent, to_agent, message_type, payload, priority, reply_to)
                    .await?;
                Ok(serde_json::to_value(receipt).unwrap_or_default())
            }
            "fabric.message.receive" => {
                let agent_id = required_str(args, "agent_id")?;
                let count = args
                    .get("count")
                    .and_then(serde_json::Value::as_u64)
                    .map_or(DEFAULT_RECEIVE_COUNT, |c| c as usize);
                let block_ms = args
                    .get("block_ms")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0);
                let group = args
                    .get("consumer_group")
                    .and_then(serde_json::Value::as_str)
                    .map(String::from);

                let batch = self
                    .bus
                    .receive(&accessor, agent_id, count, block_ms, group)
                    .await?;
                Ok(serde_json::to_value(batch).unwrap_or_default())
            }
            "fabric.message.acknowledge" => {
                let agent_id = required_str(args, "agent_id")?;
                let ids: Vec<String> = required_field(args, "message_ids")?
                    .as_array()
                    .ok_or_else(|| GatewayError::bad_input("'message_ids' must be an array"))?
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect();
                let group = args
                    .get("consumer_group")
                    .and_then(serde_json::Value::as_str)
                    .map(String::from);

                let acknowledged = self.bus.acknowledge(&accessor, agent_id, &ids, group).await?;
                Ok(serde_json::json!({"acknowledged": acknowledged}))
            }
            "fabric.message.publish" => {
                let topic = required_str(args, "topic")?;
                let message = required_field(args, "message")?.clone();
                let from_agent = required_str(args, "from_agent")?;

                let receipt = self.bus.publish(topic, message, from_agent).await?;
                Ok(serde_json::to_value(receipt).unwrap_or_default())
            }
            "fabric.message.queue_status" => {
                let agent_id = required_str(args, "agent_id")?;
                let status = self.bus.queue_status(agent_id).await?;
                Ok(serde_json::to_value(status).unwrap_or_default())
            }
            _ => Err(GatewayError::bad_input("unknown tool").with_detail("name", name)),
        }
    }

    fn log_call(
        &self,
        request: &CallRequest,
        trace: TraceContext,
        started_at: chrono::DateTime<Utc>,
        response: serde_json::Value,
    ) {
        let (target_type, target_id) = classify_target(&request.name, &request.arguments);
        self.registry.append_call_log(&CallLogRecord {
            trace_id: trace.trace_id,
            target_type,
            target_id,
            request: serde_json::json!({"name": request.name}),
            response,
            started_at,
            completed_at: Utc::now(),
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn classify_target(name: &str, args: &serde_json::Value) -> (String, String) {
    let pick = |field: &str| {
        args.get(field)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    if name == "fabric.call" || name.starts_with("fabric.agent.") || name == "fabric.route.preview"
    {
        ("agent".into(), pick("agent_id"))
    } else if name.starts_with("fabric.message.") {
        ("message".into(), name.trim_start_matches("fabric.message.").into())
    } else if name.starts_with("fabric.tool.") {
        ("tool".into(), pick("tool_id"))
    } else {
        ("gateway".into(), name.to_string())
    }
}

fn caller_tier(auth: &AuthContext) -> TrustTier {
    match auth.mode {
        AuthMode::None | AuthMode::Psk => TrustTier::Local,
        AuthMode::Passport | AuthMode::Mtls => TrustTier::Org,
    }
}

fn accessor_for(auth: &AuthContext) -> Accessor {
    match auth.mode {
        // Passport callers are agents: confined to their own namespace.
        AuthMode::Passport => Accessor::Agent(auth.principal_id.clone()),
        _ => Accessor::Gateway,
    }
}

pub(crate) fn required_str<'a>(
    args: &'a serde_json::Value,
    field: &str,
) -> Result<&'a str, GatewayError> {
    args.get(field)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            GatewayError::bad_input(format!("'{field}' is required")).with_detail("field", field)
        })
}

pub(crate) fn required_field<'a>(
    args: &'a serde_json::Value,
    field: &str,
) -> Result<&'a serde_json::Value, GatewayError> {
    args.get(field).ok_or_else(|| {
        GatewayError::bad_input(format!("'{field}' is required")).with_detail("field", field)
    })
}

pub(crate) fn capability_not_found(agent_id: &str, capability: &str) -> GatewayError {
    GatewayError::new(
        ErrorCode::CapabilityNotFound,
        format!("agent '{agent_id}' has no capability '{capability}'"),
    )
    .with_detail("agent_id", agent_id)
    .with_detail("capability", capability)
}
