// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bus message model.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery priority hint carried on every message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    /// Background traffic.
    Low,
    /// Default.
    #[default]
    Normal,
    /// Time-sensitive.
    High,
    /// Drop-everything.
    Critical,
}

/// A message brokered between agents.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Message {
    /// User-facing message identifier.
    pub message_id: Uuid,

    /// Sending agent id.
    pub from_agent: String,

    /// Receiving agent id; `None` for topic publishes.
    pub to_agent: Option<String>,

    /// Free-form message type (e.g. `"task"`).
    pub message_type: String,

    /// Arbitrary JSON payload.
    pub payload: serde_json::Value,

    /// Delivery priority hint.
    #[serde(default)]
    pub priority: MessagePriority,

    /// Optional routing hint for replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    /// When the message was created.
    pub timestamp: DateTime<Utc>,

    /// Ordered id assigned by the stream store on append.
    ///
    /// This is the authoritative acknowledgment key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_entry_id: Option<String>,
}

impl Message {
    /// Create a new inbox message with a fresh id and current timestamp.
    #[must_use]
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        message_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            from_agent: from_agent.into(),
            to_agent: Some(to_agent.into()),
            message_type: message_type.into(),
            payload,
            priority: MessagePriority::Normal,
            reply_to: None,
            timestamp: Utc::now(),
            stream_entry_id: None,
        }
    }

    /// Builder-style: set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder-style: set the reply-to routing hint.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}
