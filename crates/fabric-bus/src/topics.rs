// SPDX-License-Identifier: MIT OR Apache-2.0
//! Topic pub/sub over broadcast channels.
//!
//! Publishes are fire-and-forget to current subscribers only; nothing is
//! persisted. Topic names are free-form strings; by convention `shared:*`,
//! `agent.*`, `analytics.*`, and `system.*` prefixes are used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// Channel capacity per topic.
const TOPIC_CAPACITY: usize = 256;

/// One published topic message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Publishing agent.
    pub from_agent: String,
    /// Arbitrary payload.
    pub data: serde_json::Value,
    /// Publish time.
    pub published_at: DateTime<Utc>,
}

/// In-process topic registry.
#[derive(Default)]
pub struct TopicRegistry {
    topics: Mutex<BTreeMap<String, broadcast::Sender<TopicMessage>>>,
}

impl TopicRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a topic, creating it on first use.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<TopicMessage> {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Publish to all current subscribers. Returns the recipient count.
    pub fn publish(&self, topic: &str, from_agent: &str, data: serde_json::Value) -> usize {
        let message = TopicMessage {
            topic: topic.to_string(),
            from_agent: from_agent.to_string(),
            data,
            published_at: Utc::now(),
        };
        let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        match topics.get(topic) {
            Some(tx) => {
                let recipients = tx.receiver_count();
                // No receivers means the send fails; that's still a publish.
                let _ = tx.send(message);
                recipients
            }
            None => 0,
        }
    }

    /// Names of all topics that have ever been subscribed, with their
    /// current subscriber counts.
    pub fn list(&self) -> Vec<(String, usize)> {
        let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics
            .iter()
            .map(|(name, tx)| (name.clone(), tx.receiver_count()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_current_subscribers() {
        let reg = TopicRegistry::new();
        let mut sub_a = reg.subscribe("shared:announcements");
        let mut sub_b = reg.subscribe("shared:announcements");

        let recipients = reg.publish("shared:announcements", "a", serde_json::json!({"v": 1}));
        assert_eq!(recipients, 2);

        assert_eq!(sub_a.recv().await.unwrap().data["v"], 1);
        assert_eq!(sub_b.recv().await.unwrap().data["v"], 1);
    }

    #[test]
    fn publish_without_subscribers_is_zero_recipients() {
        let reg = TopicRegistry::new();
        assert_eq!(reg.publish("agent.b", "a", serde_json::Value::Null), 0);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let reg = TopicRegistry::new();
        let mut sub = reg.subscribe("system.alerts");
        reg.subscribe("analytics.events");

        reg.publish("analytics.events", "a", serde_json::json!(1));
        reg.publish("system.alerts", "a", serde_json::json!(2));

        assert_eq!(sub.recv().await.unwrap().data, serde_json::json!(2));
        assert!(sub.try_recv().is_err(), "no cross-topic leakage");
    }

    #[test]
    fn list_reports_subscriber_counts() {
        let reg = TopicRegistry::new();
        let _keep = reg.subscribe("shared:x");
        let listed = reg.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], ("shared:x".to_string(), 1));
    }
}
