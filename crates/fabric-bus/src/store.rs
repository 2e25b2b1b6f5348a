// SPDX-License-Identifier: MIT OR Apache-2.0
//! The ordered-stream store backing per-agent inboxes.
//!
//! One stream per agent (`agent:{agent_id}:inbox`), strictly monotonic entry
//! ids, consumer groups with per-group cursors and pending lists, and
//! visibility-horizon reclaim. This is the at-least-once delivery engine;
//! there is no separate retry table.

use fabric_core::Message;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use uuid::Uuid;

/// Who is performing a store operation.
///
/// Store-level isolation: an agent accessor may only read and acknowledge
/// its own inbox. The gateway accessor is privileged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// The gateway itself (pipeline dispatch).
    Gateway,
    /// A specific agent's credentials.
    Agent(String),
}

impl Accessor {
    fn may_read(&self, inbox_owner: &str) -> bool {
        match self {
            Self::Gateway => true,
            Self::Agent(id) => id == inbox_owner,
        }
    }
}

/// Ordered entry identifier: `<millis>-<seq>`, strictly increasing per inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntryId {
    /// Milliseconds component.
    pub ms: u64,
    /// Tie-break sequence within the same millisecond.
    pub seq: u64,
}

impl EntryId {
    const ZERO: EntryId = EntryId { ms: 0, seq: 0 };
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ms, seq) = s.split_once('-').ok_or(())?;
        Ok(Self {
            ms: ms.parse().map_err(|_| ())?,
            seq: seq.parse().map_err(|_| ())?,
        })
    }
}

/// A delivery waiting for acknowledgment.
#[derive(Debug, Clone)]
struct PendingDelivery {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u32,
}

/// Per-group read state on one inbox.
#[derive(Debug, Default)]
struct ConsumerGroup {
    /// Highest entry id handed out as a *new* delivery.
    cursor: Option<EntryId>,
    pending: BTreeMap<EntryId, PendingDelivery>,
}

/// One delivered entry.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Stream entry id (the acknowledgment key).
    pub entry_id: EntryId,
    /// The message, with `stream_entry_id` filled in.
    pub message: Message,
    /// How many times this entry has been delivered in this group.
    pub delivery_count: u32,
}

/// Summary of one consumer group, for queue status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GroupInfo {
    /// Group name.
    pub name: String,
    /// Entries delivered but not yet acknowledged.
    pub pending: usize,
    /// Last new entry id handed out.
    pub last_delivered_id: Option<String>,
}

#[derive(Debug, Default)]
struct Inbox {
    entries: BTreeMap<EntryId, Message>,
    groups: BTreeMap<String, ConsumerGroup>,
    /// `message_id` → entry id alias index for acknowledgments.
    aliases: BTreeMap<Uuid, EntryId>,
    last_id: EntryId,
    notify: Arc<Notify>,
}

impl Inbox {
    fn next_id(&mut self, now_ms: u64) -> EntryId {
        let id = if now_ms > self.last_id.ms {
            EntryId { ms: now_ms, seq: 0 }
        } else {
            EntryId {
                ms: self.last_id.ms,
                seq: self.last_id.seq + 1,
            }
        };
        self.last_id = id;
        id
    }

    /// Drop an entry once no group can ever deliver it again.
    fn maybe_gc(&mut self, id: EntryId) {
        let retired = self.groups.values().all(|g| {
            !g.pending.contains_key(&id) && g.cursor.is_some_and(|c| c >= id)
        });
        if retired && !self.groups.is_empty() {
            if let Some(msg) = self.entries.remove(&id) {
                self.aliases.remove(&msg.message_id);
            }
        }
    }
}

/// Errors from the stream store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store has been closed (shutdown).
    Closed,
    /// The accessor may not touch this inbox.
    AccessDenied {
        /// Inbox owner.
        agent_id: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("stream store is closed"),
            Self::AccessDenied { agent_id } => {
                write!(f, "access to inbox of '{agent_id}' denied")
            }
        }
    }
}

impl std::error::Error for StoreError {}

struct StoreInner {
    inboxes: BTreeMap<String, Inbox>,
    closed: bool,
}

/// In-process ordered-stream store with consumer groups.
///
/// Cheap to clone; all clones share state. Concurrent operations are safe;
/// per-inbox ordering is strict.
#[derive(Clone)]
pub struct StreamStore {
    inner: Arc<Mutex<StoreInner>>,
    visibility_horizon: Duration,
}

impl StreamStore {
    /// Create a store with the given visibility horizon.
    #[must_use]
    pub fn new(visibility_horizon: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                inboxes: BTreeMap::new(),
                closed: false,
            })),
            visibility_horizon,
        }
    }

    /// Close the store. Every subsequent operation fails with
    /// [`StoreError::Closed`]; blocked readers wake up empty.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        for inbox in inner.inboxes.values() {
            inbox.notify.notify_waiters();
        }
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    /// Append a message to `inbox(agent_id)`, returning its entry id.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] after shutdown.
    pub async fn append(&self, agent_id: &str, mut message: Message) -> Result<EntryId, StoreError> {
        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;

        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let inbox = inner.inboxes.entry(agent_id.to_string()).or_default();
        let id = inbox.next_id(now_ms);
        message.stream_entry_id = Some(id.to_string());
        inbox.aliases.insert(message.message_id, id);
        inbox.entries.insert(id, message);
        inbox.notify.notify_waiters();

        debug!(target: "fabric.bus", agent_id, entry_id = %id, "message appended");
        Ok(id)
    }

    /// Read up to `count` entries for `consumer` in `group`, blocking up to
    /// `block` for new entries when none are immediately deliverable.
    ///
    /// Pending entries older than the visibility horizon are reclaimed first
    /// (age order), then new entries past the group cursor. The group is
    /// created on first use.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] after shutdown, [`StoreError::AccessDenied`]
    /// when `accessor` does not own the inbox.
    pub async fn read_group(
        &self,
        accessor: &Accessor,
        agent_id: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Delivery>, StoreError> {
        if !accessor.may_read(agent_id) {
            return Err(StoreError::AccessDenied {
                agent_id: agent_id.to_string(),
            });
        }

        let deadline = Instant::now() + block;
        loop {
            let notify = {
                let mut inner = self.inner.lock().await;
                if inner.closed {
                    return Err(StoreError::Closed);
                }
                let inbox = inner.inboxes.entry(agent_id.to_string()).or_default();
                let deliveries = Self::collect(inbox, group, consumer, count, self.visibility_horizon);
                if !deliveries.is_empty() {
                    return Ok(deliveries);
                }
                Arc::clone(&inbox.notify)
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            // Wake on new appends; re-check the deadline either way.
            let _ = tokio::time::timeout(remaining, notify.notified()).await;
        }
    }

    fn collect(
        inbox: &mut Inbox,
        group: &str,
        consumer: &str,
        count: usize,
        horizon: Duration,
    ) -> Vec<Delivery> {
        let now = Instant::now();
        let group_entry = inbox.groups.entry(group.to_string()).or_default();
        let mut out = Vec::new();

        // Reclaim pending entries past the visibility horizon, oldest first.
        let reclaimable: Vec<EntryId> = group_entry
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.delivered_at) >= horizon)
            .map(|(id, _)| *id)
            .take(count)
            .collect();
        for id in reclaimable {
            let Some(message) = inbox.entries.get(&id).cloned() else {
                group_entry.pending.remove(&id);
                continue;
            };
            let pending = group_entry.pending.get_mut(&id).expect("pending entry");
            pending.consumer = consumer.to_string();
            pending.delivered_at = now;
            pending.delivery_count += 1;
            out.push(Delivery {
                entry_id: id,
                message,
                delivery_count: pending.delivery_count,
            });
        }

        // Then new entries past the cursor.
        let cursor = group_entry.cursor.unwrap_or(EntryId::ZERO);
        let fresh: Vec<(EntryId, Message)> = inbox
            .entries
            .range((
                std::ops::Bound::Excluded(cursor),
                std::ops::Bound::Unbounded,
            ))
            .filter(|(id, _)| !group_entry.pending.contains_key(id))
            .take(count.saturating_sub(out.len()))
            .map(|(id, m)| (*id, m.clone()))
            .collect();

        for (id, message) in fresh {
            group_entry.pending.insert(
                id,
                PendingDelivery {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
            group_entry.cursor = Some(match group_entry.cursor {
                Some(c) if c >= id => c,
                _ => id,
            });
            out.push(Delivery {
                entry_id: id,
                message,
                delivery_count: 1,
            });
        }

        out
    }

    /// Acknowledge entries in `group`, removing them from the pending set.
    ///
    /// Ids may be stream entry ids (authoritative) or user-facing message
    /// ids (alias). Acknowledging an already-acked or unknown id is a
    /// successful no-op; only unparseable ids report `false`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] after shutdown, [`StoreError::AccessDenied`]
    /// when `accessor` does not own the inbox.
    pub async fn ack(
        &self,
        accessor: &Accessor,
        agent_id: &str,
        group: &str,
        ids: &[String],
    ) -> Result<Vec<(String, bool)>, StoreError> {
        if !accessor.may_read(agent_id) {
            return Err(StoreError::AccessDenied {
                agent_id: agent_id.to_string(),
            });
        }

        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let Some(inbox) = inner.inboxes.get_mut(agent_id) else {
            // Nothing was ever sent: every ack is a no-op success.
            return Ok(ids.iter().map(|id| (id.clone(), !id.is_empty())).collect());
        };

        let mut out = Vec::with_capacity(ids.len());
        for raw in ids {
            // Entry id is authoritative; a message id is accepted as alias.
            let parsed = raw.parse::<EntryId>().ok();
            let aliased = Uuid::parse_str(raw)
                .ok()
                .map(|mid| inbox.aliases.get(&mid).copied());

            let well_formed = parsed.is_some() || aliased.is_some();
            if let Some(id) = parsed.or(aliased.flatten()) {
                if let Some(g) = inbox.groups.get_mut(group) {
                    g.pending.remove(&id);
                }
                inbox.maybe_gc(id);
            }
            // Unknown-but-well-formed ids are idempotent no-op successes.
            out.push((raw.clone(), well_formed));
        }
        Ok(out)
    }

    /// Entries not yet acknowledged by `group`: pending plus undelivered.
    ///
    /// When the group does not exist yet, every entry counts.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] after shutdown.
    pub async fn depth(&self, agent_id: &str, group: &str) -> Result<usize, StoreError> {
        let inner = self.inner.lock().await;
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let Some(inbox) = inner.inboxes.get(agent_id) else {
            return Ok(0);
        };
        let Some(g) = inbox.groups.get(group) else {
            return Ok(inbox.entries.len());
        };
        let cursor = g.cursor.unwrap_or(EntryId::ZERO);
        let undelivered = inbox
            .entries
            .range((
                std::ops::Bound::Excluded(cursor),
                std::ops::Bound::Unbounded,
            ))
            .filter(|(id, _)| !g.pending.contains_key(id))
            .count();
        Ok(undelivered + g.pending.len())
    }

    /// Group summaries and stream length for queue status.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] after shutdown.
    pub async fn stream_info(&self, agent_id: &str) -> Result<(usize, Vec<GroupInfo>), StoreError> {
        let inner = self.inner.lock().await;
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let Some(inbox) = inner.inboxes.get(agent_id) else {
            return Ok((0, Vec::new()));
        };
        let groups = inbox
            .groups
            .iter()
            .map(|(name, g)| GroupInfo {
                name: name.clone(),
                pending: g.pending.len(),
                last_delivered_id: g.cursor.map(|c| c.to_string()),
            })
            .collect();
        Ok((inbox.entries.len(), groups))
    }
}
