// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scripted in-process adapter for tests and `local` endpoints.

use crate::{EventStream, RuntimeAdapter};
use async_trait::async_trait;
use fabric_core::{AgentManifest, AgentStatus, CanonicalEnvelope, StreamEvent};
use fabric_error::{ErrorBody, ErrorCode, GatewayError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// What the mock does when called.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Echo the envelope's task back as the result.
    Echo,
    /// Return this fixed result.
    Result(serde_json::Value),
    /// Fail with this code and message.
    Fail(ErrorCode, String),
}

/// An in-process adapter that never leaves the gateway.
pub struct MockAdapter {
    manifest: AgentManifest,
    behavior: MockBehavior,
    health: AgentStatus,
}

impl MockAdapter {
    /// An echoing mock for the given manifest.
    #[must_use]
    pub fn echo(manifest: AgentManifest) -> Self {
        Self {
            manifest,
            behavior: MockBehavior::Echo,
            health: AgentStatus::Online,
        }
    }

    /// A mock with explicit behavior.
    #[must_use]
    pub fn scripted(manifest: AgentManifest, behavior: MockBehavior) -> Self {
        Self {
            manifest,
            behavior,
            health: AgentStatus::Online,
        }
    }

    /// Builder-style: override the probe result.
    #[must_use]
    pub fn with_health(mut self, health: AgentStatus) -> Self {
        self.health = health;
        self
    }

    fn result_for(&self, envelope: &CanonicalEnvelope) -> Result<serde_json::Value, GatewayError> {
        match &self.behavior {
            MockBehavior::Echo => Ok(serde_json::json!({
                "agent_id": self.manifest.agent_id,
                "capability": envelope.target.capability,
                "echo": envelope.input.task,
            })),
            MockBehavior::Result(value) => Ok(value.clone()),
            MockBehavior::Fail(code, message) => Err(GatewayError::new(*code, message.clone())),
        }
    }
}

#[async_trait]
impl RuntimeAdapter for MockAdapter {
    async fn call(&self, envelope: &CanonicalEnvelope) -> Result<serde_json::Value, GatewayError> {
        self.result_for(envelope)
    }

    async fn call_stream(&self, envelope: &CanonicalEnvelope) -> Result<EventStream, GatewayError> {
        let (tx, rx) = mpsc::channel(16);
        let trace = envelope.trace;
        let outcome = self.result_for(envelope);
        let task_text = envelope.input.task.clone().unwrap_or_default();

        tokio::spawn(async move {
            let _ = tx.send(StreamEvent::status("accepted")).await;
            match outcome {
                Ok(result) => {
                    // Stream the task back word by word before the terminal.
                    for word in task_text.split_whitespace() {
                        if tx.send(StreamEvent::token(word)).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(StreamEvent::final_ok(trace, result)).await;
                }
                Err(err) => {
                    let _ = tx
                        .send(StreamEvent::final_error(trace, ErrorBody::from(err)))
                        .await;
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    async fn probe_health(&self) -> AgentStatus {
        self.health
    }

    fn describe(&self) -> AgentManifest {
        self.manifest.clone()
    }
}
