// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed streaming events.
//!
//! A streamed call yields a lazy sequence of [`StreamEvent`]s. The terminal
//! event is always `final`, carrying either `{ok:true, result}` or
//! `{ok:false, error}`; nothing follows it.

use crate::trace::TraceContext;
use fabric_error::ErrorBody;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One event in a streamed response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StreamEvent {
    /// Trace identifiers, present on the terminal event at minimum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,

    /// The event payload.
    #[serde(flatten)]
    pub kind: StreamEventKind,
}

/// The payload discriminator for [`StreamEvent`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEventKind {
    /// Lifecycle note (e.g. "accepted", "running").
    Status {
        /// Human-readable status text.
        message: String,
    },

    /// Incremental output text.
    Token {
        /// The text fragment.
        text: String,
    },

    /// The agent invoked a tool while handling the call.
    ToolCall {
        /// Tool name as reported by the agent.
        tool_name: String,
        /// JSON input passed to the tool.
        input: serde_json::Value,
    },

    /// Progress indication.
    Progress {
        /// Completion fraction in `[0.0, 1.0]`, if known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fraction: Option<f64>,
        /// Human-readable progress note.
        #[serde(default)]
        message: String,
    },

    /// Terminal event. Nothing follows it.
    Final {
        /// Whether the call succeeded.
        ok: bool,
        /// Result payload on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        /// Error payload on failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody>,
    },
}

impl StreamEvent {
    /// A `status` event.
    #[must_use]
    pub fn status(message: impl Into<String>) -> Self {
        Self {
            trace: None,
            kind: StreamEventKind::Status {
                message: message.into(),
            },
        }
    }

    /// A `token` event.
    #[must_use]
    pub fn token(text: impl Into<String>) -> Self {
        Self {
            trace: None,
            kind: StreamEventKind::Token { text: text.into() },
        }
    }

    /// A successful terminal event.
    #[must_use]
    pub fn final_ok(trace: TraceContext, result: serde_json::Value) -> Self {
        Self {
            trace: Some(trace),
            kind: StreamEventKind::Final {
                ok: true,
                result: Some(result),
                error: None,
            },
        }
    }

    /// A failed terminal event.
    #[must_use]
    pub fn final_error(trace: TraceContext, error: ErrorBody) -> Self {
        Self {
            trace: Some(trace),
            kind: StreamEventKind::Final {
                ok: false,
                result: None,
                error: Some(error),
            },
        }
    }

    /// Returns `true` for the terminal `final` event.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, StreamEventKind::Final { .. })
    }

    /// Attach trace identifiers.
    #[must_use]
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }
}
