// SPDX-License-Identifier: MIT OR Apache-2.0
//! Agent-capability dispatch.
//!
//! Resolution order: explicit `agent_id` first; on adapter-side
//! `AGENT_OFFLINE` or `TIMEOUT` the registry's capability listing supplies
//! fallbacks, tried once each under the same trace. The attempted chain is
//! reported under `error.details.fallbacks` when every candidate fails.

use crate::{CallOutcome, Gateway, capability_not_found, required_str};
use fabric_core::envelope::{CallInput, CanonicalEnvelope, ResponseSpec, TargetKind, TargetSpec};
use fabric_core::{AgentManifest, AuthContext, CallResponse, TraceContext};
use fabric_error::{ErrorCode, GatewayError};
use tracing::{debug, info, warn};

impl Gateway {
    pub(crate) async fn dispatch_agent(
        &self,
        args: &serde_json::Value,
        auth: &AuthContext,
        trace: TraceContext,
    ) -> Result<CallOutcome, GatewayError> {
        // Phase 5: required arguments.
        let agent_id = required_str(args, "agent_id")?;
        let capability = required_str(args, "capability")?;
        let task = required_str(args, "task")?;

        let stream_requested = args
            .get("stream")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        let timeout_ms = args.get("timeout_ms").and_then(serde_json::Value::as_u64);

        // Phase 7: resolve the primary target.
        let manifest = self.registry().require(agent_id)?;
        let descriptor = manifest
            .capability(capability)
            .ok_or_else(|| capability_not_found(agent_id, capability))?
            .clone();
        if !manifest.status.is_dispatchable() {
            return Err(GatewayError::new(
                ErrorCode::AgentOffline,
                format!("agent '{agent_id}' is {:?}", manifest.status),
            )
            .with_detail("agent_id", agent_id));
        }

        // Phase 6: build the canonical envelope.
        let envelope = CanonicalEnvelope {
            trace: trace.child(),
            auth: auth.clone(),
            target: TargetSpec {
                kind: TargetKind::Agent,
                id: agent_id.to_string(),
                capability: capability.to_string(),
                timeout_ms,
            },
            input: CallInput {
                task: Some(task.to_string()),
                context: args.get("context").cloned(),
                attachments: Vec::new(),
                parameters: args.get("parameters").cloned(),
            },
            response: ResponseSpec {
                stream: stream_requested,
                format: "json".into(),
            },
        };

        // Phase 8: streaming only when requested *and* declared.
        if stream_requested && descriptor.streaming {
            let adapter = self.adapters().adapter_for(&manifest)?;
            let stream = adapter.call_stream(&envelope).await?;
            return Ok(CallOutcome::Stream(stream));
        }
        if stream_requested {
            // Degrades to a sync response; recorded on the trace.
            info!(
                target: "fabric.pipeline",
                agent_id,
                capability,
                "stream requested on non-streaming capability; degraded to sync"
            );
        }

        self.call_with_fallbacks(manifest, envelope, trace).await
    }

    pub(crate) fn adapters(&self) -> &dyn fabric_adapters::AdapterFactory {
        self.adapters.as_ref()
    }

    /// Try the primary, then each fallback candidate once, on retryable
    /// adapter failures.
    async fn call_with_fallbacks(
        &self,
        primary: AgentManifest,
        envelope: CanonicalEnvelope,
        trace: TraceContext,
    ) -> Result<CallOutcome, GatewayError> {
        let capability = envelope.target.capability.clone();
        let mut attempted: Vec<String> = Vec::new();
        let mut candidates = vec![primary.agent_id.clone()];
        candidates.extend(
            self.registry()
                .find_by_capability(&capability)
                .into_iter()
                .map(|(id, _)| id)
                .filter(|id| *id != primary.agent_id),
        );

        let mut last_error: Option<GatewayError> = None;

        for candidate in candidates {
            let Some(manifest) = self.registry().get(&candidate) else {
                // Deregistered between listing and dispatch.
                continue;
            };
            if !manifest.status.is_dispatchable() || !manifest.has_capability(&capability) {
                continue;
            }

            if !attempted.is_empty() {
                self.metrics.record_fallback_attempt();
                debug!(target: "fabric.pipeline", candidate = %candidate, "trying fallback agent");
            }

            let adapter = match self.adapters().adapter_for(&manifest) {
                Ok(a) => a,
                Err(err) => {
                    attempted.push(candidate);
                    last_error = Some(err);
                    continue;
                }
            };

            // Each execution attempt gets its own span; the trace id is shared.
            let mut attempt = envelope.clone();
            attempt.target.id = candidate.clone();
            attempt.trace = trace.child();

            match adapter.call(&attempt).await {
                Ok(result) => {
                    if !attempted.is_empty() {
                        info!(
                            target: "fabric.pipeline",
                            agent_id = %candidate,
                            fallbacks = ?attempted,
                            "call succeeded on fallback agent"
                        );
                    }
                    return Ok(CallOutcome::Response(CallResponse::success(trace, result)));
                }
                Err(err) if matches!(err.code, ErrorCode::AgentOffline | ErrorCode::Timeout) => {
                    warn!(
                        target: "fabric.pipeline",
                        agent_id = %candidate,
                        code = err.code.as_str(),
                        "agent attempt failed; considering fallback"
                    );
                    attempted.push(candidate);
                    last_error = Some(err);
                }
                Err(err) => {
                    // Non-retryable failures surface immediately.
                    return Err(annotate_fallbacks(err, &attempted));
                }
            }
        }

        let err = last_error.unwrap_or_else(|| {
            GatewayError::new(
                ErrorCode::AgentOffline,
                format!("no dispatchable agent provides '{capability}'"),
            )
        });
        Err(annotate_fallbacks(err, &attempted))
    }
}

fn annotate_fallbacks(err: GatewayError, attempted: &[String]) -> GatewayError {
    if attempted.is_empty() {
        err
    } else {
        err.with_detail("fallbacks", attempted)
    }
}
