// SPDX-License-Identifier: MIT OR Apache-2.0
//! fabric-bus
//!
//! The async message bus: persistent per-agent inboxes over an ordered
//! stream store with consumer groups, plus non-persistent topic pub/sub.
//!
//! Delivery guarantees: at-least-once into each consumer group; within a
//! group an entry goes to one consumer until acknowledged; unacknowledged
//! deliveries past the visibility horizon are reclaimable by another
//! consumer in the same group. Per-inbox ordering is strictly monotonic by
//! entry id; there is no global ordering.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The ordered-stream store.
pub mod store;
/// Topic pub/sub.
pub mod topics;

use fabric_core::{Message, MessagePriority};
use fabric_error::{ErrorCode, GatewayError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use store::{Accessor, Delivery, EntryId, GroupInfo, StoreError, StreamStore};
pub use topics::{TopicMessage, TopicRegistry};

/// Default consumer group for an agent's inbox.
#[must_use]
pub fn default_group(agent_id: &str) -> String {
    format!("{agent_id}_workers")
}

/// Result of a send: the acknowledgment keys.
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    /// User-facing message id.
    pub message_id: uuid::Uuid,
    /// Always `"queued"`.
    pub status: &'static str,
    /// Stream entry id (authoritative acknowledgment key).
    pub stream_id: String,
}

/// Result of a receive.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiveBatch {
    /// Delivered messages, age-ordered.
    pub messages: Vec<Message>,
    /// Number of messages delivered.
    pub count: usize,
    /// Inbox owner.
    pub agent_id: String,
}

/// Per-id acknowledgment outcome.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AckEntry {
    /// The id as supplied by the caller.
    pub id: String,
    /// Whether the id was accepted.
    pub acked: bool,
}

/// Result of a publish.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReceipt {
    /// Topic published to.
    pub topic: String,
    /// Subscribers that received the message.
    pub recipients: usize,
    /// Always `true`.
    pub published: bool,
}

/// Queue inspection result.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Inbox owner.
    pub agent_id: String,
    /// Entries not yet acknowledged by the default group.
    pub queue_depth: usize,
    /// Stream length and per-group summaries.
    pub stream_info: StreamInfo,
}

/// Stream length and group summaries.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    /// Total entries currently held in the stream.
    pub length: usize,
    /// Per-group summaries.
    pub groups: Vec<GroupInfo>,
}

/// The message bus facade the pipeline dispatches to.
///
/// Cheap to clone; the store connection is shared and closes on shutdown.
#[derive(Clone)]
pub struct MessageBus {
    store: StreamStore,
    topics: Arc<TopicRegistry>,
}

impl MessageBus {
    /// Create a bus with the given visibility horizon.
    #[must_use]
    pub fn new(visibility_horizon: Duration) -> Self {
        Self {
            store: StreamStore::new(visibility_horizon),
            topics: Arc::new(TopicRegistry::new()),
        }
    }

    /// Access the underlying stream store (tests, monitoring fronts).
    #[must_use]
    pub fn store(&self) -> &StreamStore {
        &self.store
    }

    /// Access the topic registry.
    #[must_use]
    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    /// Close the bus: the store refuses further operations.
    pub async fn shutdown(&self) {
        self.store.close().await;
        info!(target: "fabric.bus", "message bus closed");
    }

    /// Append a message to the recipient's inbox.
    ///
    /// # Errors
    ///
    /// `BUS_UNAVAILABLE` when the store is closed.
    pub async fn send(
        &self,
        from_agent: &str,
        to_agent: &str,
        message_type: &str,
        payload: serde_json::Value,
        priority: MessagePriority,
        reply_to: Option<String>,
    ) -> Result<SendReceipt, GatewayError> {
        let mut message = Message::new(from_agent, to_agent, message_type, payload)
            .with_priority(priority);
        if let Some(reply_to) = reply_to {
            message = message.with_reply_to(reply_to);
        }
        let message_id = message.message_id;

        let entry_id = self
            .store
            .append(to_agent, message)
            .await
            .map_err(bus_error)?;

        Ok(SendReceipt {
            message_id,
            status: "queued",
            stream_id: entry_id.to_string(),
        })
    }

    /// Read up to `count` pending messages, blocking up to `block_ms`.
    ///
    /// The consumer group defaults to `{agent_id}_workers` and is created on
    /// first use.
    ///
    /// # Errors
    ///
    /// `BUS_UNAVAILABLE` when the store is closed or the accessor does not
    /// own the inbox.
    pub async fn receive(
        &self,
        accessor: &Accessor,
        agent_id: &str,
        count: usize,
        block_ms: u64,
        consumer_group: Option<String>,
    ) -> Result<ReceiveBatch, GatewayError> {
        let group = consumer_group.unwrap_or_else(|| default_group(agent_id));
        let consumer = format!("{agent_id}-consumer");

        let deliveries = self
            .store
            .read_group(
                accessor,
                agent_id,
                &group,
                &consumer,
                count.max(1),
                Duration::from_millis(block_ms),
            )
            .await
            .map_err(bus_error)?;

        let messages: Vec<Message> = deliveries.into_iter().map(|d| d.message).collect();
        Ok(ReceiveBatch {
            count: messages.len(),
            agent_id: agent_id.to_string(),
            messages,
        })
    }

    /// Acknowledge delivered messages.
    ///
    /// # Errors
    ///
    /// `BUS_UNAVAILABLE` when the store is closed or the accessor does not
    /// own the inbox.
    pub async fn acknowledge(
        &self,
        accessor: &Accessor,
        agent_id: &str,
        message_ids: &[String],
        consumer_group: Option<String>,
    ) -> Result<Vec<AckEntry>, GatewayError> {
        let group = consumer_group.unwrap_or_else(|| default_group(agent_id));
        let acked = self
            .store
            .ack(accessor, agent_id, &group, message_ids)
            .await
            .map_err(bus_error)?;

        Ok(acked
            .into_iter()
            .map(|(id, acked)| AckEntry { id, acked })
            .collect())
    }

    /// Broadcast to a topic's current subscribers. Nothing is persisted.
    ///
    /// # Errors
    ///
    /// `BUS_UNAVAILABLE` when the store is closed (shutdown also severs
    /// pub/sub).
    pub async fn publish(
        &self,
        topic: &str,
        data: serde_json::Value,
        from_agent: &str,
    ) -> Result<PublishReceipt, GatewayError> {
        // Publishing after shutdown must not look like success.
        if self.store.is_closed().await {
            return Err(bus_error(StoreError::Closed));
        }

        let recipients = self.topics.publish(topic, from_agent, data);
        Ok(PublishReceipt {
            topic: topic.to_string(),
            recipients,
            published: true,
        })
    }

    /// Pending length and group info for an agent's inbox.
    ///
    /// # Errors
    ///
    /// `BUS_UNAVAILABLE` when the store is closed.
    pub async fn queue_status(&self, agent_id: &str) -> Result<QueueStatus, GatewayError> {
        let group = default_group(agent_id);
        let queue_depth = self.store.depth(agent_id, &group).await.map_err(bus_error)?;
        let (length, groups) = self.store.stream_info(agent_id).await.map_err(bus_error)?;

        Ok(QueueStatus {
            agent_id: agent_id.to_string(),
            queue_depth,
            stream_info: StreamInfo { length, groups },
        })
    }
}

fn bus_error(e: StoreError) -> GatewayError {
    GatewayError::new(ErrorCode::BusUnavailable, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GW: Accessor = Accessor::Gateway;

    fn bus() -> MessageBus {
        MessageBus::new(Duration::from_secs(30))
    }

    #[tokio::test]
    async fn send_receive_ack_round_trip() {
        let bus = bus();
        let receipt = bus
            .send(
                "a",
                "b",
                "task",
                serde_json::json!({"k": 1}),
                MessagePriority::Normal,
                None,
            )
            .await
            .unwrap();
        assert_eq!(receipt.status, "queued");

        let batch = bus.receive(&GW, "b", 1, 1000, None).await.unwrap();
        assert_eq!(batch.count, 1);
        assert_eq!(batch.messages[0].payload["k"], 1);
        let entry_id = batch.messages[0].stream_entry_id.clone().unwrap();
        assert_eq!(entry_id, receipt.stream_id);

        let acked = bus
            .acknowledge(&GW, "b", &[entry_id.clone()], None)
            .await
            .unwrap();
        assert_eq!(
            acked,
            vec![AckEntry {
                id: entry_id,
                acked: true
            }]
        );

        let again = bus.receive(&GW, "b", 1, 100, None).await.unwrap();
        assert_eq!(again.count, 0);
    }

    #[tokio::test]
    async fn ordering_within_an_inbox() {
        let bus = bus();
        for k in 1..=3 {
            bus.send("a", "b", "task", serde_json::json!({"k": k}), MessagePriority::Normal, None)
                .await
                .unwrap();
        }
        let batch = bus.receive(&GW, "b", 10, 0, None).await.unwrap();
        let ks: Vec<i64> = batch
            .messages
            .iter()
            .map(|m| m.payload["k"].as_i64().unwrap())
            .collect();
        assert_eq!(ks, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn queue_status_tracks_unacked_sends() {
        let bus = bus();
        for _ in 0..4 {
            bus.send("a", "b", "task", serde_json::Value::Null, MessagePriority::Low, None)
                .await
                .unwrap();
        }
        let status = bus.queue_status("b").await.unwrap();
        assert_eq!(status.queue_depth, 4);
        assert_eq!(status.stream_info.length, 4);
    }

    #[tokio::test]
    async fn publish_counts_recipients() {
        let bus = bus();
        let _sub = bus.topics().subscribe("shared:news");
        let receipt = bus
            .publish("shared:news", serde_json::json!({"v": 1}), "a")
            .await
            .unwrap();
        assert!(receipt.published);
        assert_eq!(receipt.recipients, 1);
    }

    #[tokio::test]
    async fn shutdown_yields_bus_unavailable() {
        let bus = bus();
        bus.shutdown().await;

        let err = bus
            .send("a", "b", "task", serde_json::Value::Null, MessagePriority::Normal, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BusUnavailable);

        let err = bus.queue_status("b").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BusUnavailable);

        let err = bus
            .publish("shared:x", serde_json::Value::Null, "a")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BusUnavailable);
    }

    #[tokio::test]
    async fn foreign_inbox_reads_are_denied() {
        let bus = bus();
        bus.send("a", "b", "task", serde_json::Value::Null, MessagePriority::Normal, None)
            .await
            .unwrap();

        let err = bus
            .receive(&Accessor::Agent("a".into()), "b", 1, 0, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BusUnavailable);
    }

    #[tokio::test]
    async fn custom_group_is_honored() {
        let bus = bus();
        bus.send("a", "b", "task", serde_json::json!(1), MessagePriority::Normal, None)
            .await
            .unwrap();

        let batch = bus
            .receive(&GW, "b", 1, 0, Some("observers".into()))
            .await
            .unwrap();
        assert_eq!(batch.count, 1);

        // Default group still sees the entry (independent cursors).
        let batch = bus.receive(&GW, "b", 1, 0, None).await.unwrap();
        assert_eq!(batch.count, 1);
    }
}
