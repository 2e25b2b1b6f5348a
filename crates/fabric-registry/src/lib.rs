// SPDX-License-Identifier: MIT OR Apache-2.0
//! fabric-registry
//!
//! The agent registry: manifests, health state, and capability lookup.
//!
//! The registry is a single-writer logical data structure. Mutations take
//! the writer lock; readers get a consistent snapshot per operation. The
//! pipeline never talks to storage directly — both storage variants sit
//! behind [`storage::RegistryStorage`] and the registry mirrors mutations
//! into whichever one it was built with.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Background health probing.
pub mod health;
/// Persistence variants (memory and durable file tables).
pub mod storage;

use chrono::{DateTime, Utc};
use fabric_core::{AgentManifest, AgentStatus};
use fabric_error::{ErrorCode, GatewayError};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

pub use health::{HealthProbe, HealthProber, HealthRecord};
pub use storage::{CallLogRecord, FileStorage, MemoryStorage, RegistryStorage};

/// Filter for [`AgentRegistry::list`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Keep only agents declaring this capability.
    pub capability: Option<String>,
    /// Keep only agents carrying this tag.
    pub tag: Option<String>,
    /// Keep only agents in this status.
    pub status: Option<AgentStatus>,
}

impl ListFilter {
    fn matches(&self, manifest: &AgentManifest) -> bool {
        if let Some(ref cap) = self.capability {
            if !manifest.has_capability(cap) {
                return false;
            }
        }
        if let Some(ref tag) = self.tag {
            if !manifest.tags.contains(tag) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if manifest.status != status {
                return false;
            }
        }
        true
    }
}

/// Per-agent bookkeeping kept alongside the manifest.
#[derive(Debug, Clone)]
struct AgentEntry {
    manifest: AgentManifest,
    consecutive_failures: u32,
}

/// The agent registry.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct AgentRegistry {
    inner: Arc<RwLock<BTreeMap<String, AgentEntry>>>,
    storage: Arc<dyn RegistryStorage>,
}

impl AgentRegistry {
    /// Create an empty registry over the given storage variant.
    ///
    /// Durable storage is hydrated: agents persisted by a previous run are
    /// loaded back with their last known status.
    #[must_use]
    pub fn new(storage: Arc<dyn RegistryStorage>) -> Self {
        let mut map = BTreeMap::new();
        for manifest in storage.load_agents() {
            map.insert(
                manifest.agent_id.clone(),
                AgentEntry {
                    manifest,
                    consecutive_failures: 0,
                },
            );
        }
        Self {
            inner: Arc::new(RwLock::new(map)),
            storage,
        }
    }

    /// Create an in-memory registry with no persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage))
    }

    /// Register an agent, replacing any previous manifest under the same id.
    ///
    /// # Errors
    ///
    /// Returns `BAD_INPUT` if the manifest fails identifier validation.
    pub fn register(&self, manifest: AgentManifest) -> Result<(), GatewayError> {
        manifest
            .validate()
            .map_err(|e| GatewayError::bad_input(e.to_string()))?;

        let mut guard = self.write();
        let replaced = guard
            .insert(
                manifest.agent_id.clone(),
                AgentEntry {
                    manifest: manifest.clone(),
                    consecutive_failures: 0,
                },
            )
            .is_some();
        self.persist(&guard);
        drop(guard);

        info!(
            target: "fabric.registry",
            agent_id = %manifest.agent_id,
            replaced,
            "agent registered"
        );
        Ok(())
    }

    /// Remove an agent, returning its manifest.
    ///
    /// # Errors
    ///
    /// Returns `AGENT_NOT_FOUND` if no agent is registered under `agent_id`.
    pub fn deregister(&self, agent_id: &str) -> Result<AgentManifest, GatewayError> {
        let mut guard = self.write();
        let entry = guard.remove(agent_id).ok_or_else(|| not_found(agent_id))?;
        self.persist(&guard);
        drop(guard);

        info!(target: "fabric.registry", agent_id, "agent deregistered");
        Ok(entry.manifest)
    }

    /// Look up an agent by id.
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<AgentManifest> {
        self.read().get(agent_id).map(|e| e.manifest.clone())
    }

    /// Look up an agent by id, failing with `AGENT_NOT_FOUND`.
    ///
    /// # Errors
    ///
    /// Returns `AGENT_NOT_FOUND` if no agent is registered under `agent_id`.
    pub fn require(&self, agent_id: &str) -> Result<AgentManifest, GatewayError> {
        self.get(agent_id).ok_or_else(|| not_found(agent_id))
    }

    /// List agents matching the filter.
    ///
    /// Results are stable-ordered: primary by status rank (online < degraded
    /// < unknown < offline), secondary by display name.
    #[must_use]
    pub fn list(&self, filter: &ListFilter) -> Vec<AgentManifest> {
        let mut out: Vec<AgentManifest> = self
            .read()
            .values()
            .filter(|e| filter.matches(&e.manifest))
            .map(|e| e.manifest.clone())
            .collect();
        out.sort_by(|a, b| {
            a.status
                .rank()
                .cmp(&b.status.rank())
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        out
    }

    /// Find agents declaring the named capability.
    ///
    /// Returns `(agent_id, priority)` pairs; priority 0 is the best
    /// candidate. Ordering follows [`list`](Self::list).
    #[must_use]
    pub fn find_by_capability(&self, capability: &str) -> Vec<(String, u32)> {
        self.list(&ListFilter {
            capability: Some(capability.to_string()),
            ..ListFilter::default()
        })
        .into_iter()
        .enumerate()
        .map(|(i, m)| (m.agent_id, i as u32))
        .collect()
    }

    /// Update an agent's status.
    ///
    /// Monotone with respect to `last_seen_at`: an update stamped older than
    /// the recorded `last_seen_at` is discarded.
    ///
    /// # Errors
    ///
    /// Returns `AGENT_NOT_FOUND` if no agent is registered under `agent_id`.
    pub fn update_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        last_seen_at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let mut guard = self.write();
        let entry = guard.get_mut(agent_id).ok_or_else(|| not_found(agent_id))?;

        if let Some(seen) = entry.manifest.last_seen_at {
            if last_seen_at < seen {
                debug!(
                    target: "fabric.registry",
                    agent_id,
                    "discarding stale status update"
                );
                return Ok(());
            }
        }

        entry.manifest.status = status;
        entry.manifest.last_seen_at = Some(last_seen_at);
        self.persist(&guard);
        Ok(())
    }

    /// Record a heartbeat: mark the agent seen now and promote it online.
    ///
    /// # Errors
    ///
    /// Returns `AGENT_NOT_FOUND` if no agent is registered under `agent_id`.
    pub fn heartbeat(&self, agent_id: &str) -> Result<(), GatewayError> {
        let mut guard = self.write();
        let entry = guard.get_mut(agent_id).ok_or_else(|| not_found(agent_id))?;
        entry.manifest.status = AgentStatus::Online;
        entry.manifest.last_seen_at = Some(Utc::now());
        entry.consecutive_failures = 0;
        self.persist(&guard);
        Ok(())
    }

    /// Record a probe result and apply the demotion ladder.
    ///
    /// One success promotes straight to online. Two consecutive failures
    /// demote online → degraded; three more demote degraded → offline.
    /// Returns the agent's status after the update.
    ///
    /// # Errors
    ///
    /// Returns `AGENT_NOT_FOUND` if no agent is registered under `agent_id`.
    pub fn record_probe(
        &self,
        agent_id: &str,
        success: bool,
    ) -> Result<AgentStatus, GatewayError> {
        let mut guard = self.write();
        let entry = guard.get_mut(agent_id).ok_or_else(|| not_found(agent_id))?;
        let now = Utc::now();

        if success {
            entry.consecutive_failures = 0;
            entry.manifest.status = AgentStatus::Online;
            entry.manifest.last_seen_at = Some(now);
        } else {
            entry.consecutive_failures += 1;
            match entry.manifest.status {
                AgentStatus::Online | AgentStatus::Unknown if entry.consecutive_failures >= 2 => {
                    entry.manifest.status = AgentStatus::Degraded;
                    entry.consecutive_failures = 0;
                    warn!(target: "fabric.registry", agent_id, "agent demoted to degraded");
                }
                AgentStatus::Degraded if entry.consecutive_failures >= 3 => {
                    entry.manifest.status = AgentStatus::Offline;
                    entry.consecutive_failures = 0;
                    warn!(target: "fabric.registry", agent_id, "agent demoted to offline");
                }
                _ => {}
            }
        }

        let status = entry.manifest.status;
        self.persist(&guard);
        Ok(status)
    }

    /// Demote agents with no heartbeat inside the staleness window.
    ///
    /// Returns the ids of agents demoted to offline.
    pub fn demote_stale(&self, staleness: chrono::Duration) -> Vec<String> {
        let cutoff = Utc::now() - staleness;
        let mut demoted = Vec::new();

        let mut guard = self.write();
        for (id, entry) in guard.iter_mut() {
            if entry.manifest.status == AgentStatus::Offline {
                continue;
            }
            let stale = match entry.manifest.last_seen_at {
                Some(seen) => seen < cutoff,
                // Never seen: only demote agents that were considered live.
                None => entry.manifest.status.is_dispatchable(),
            };
            if stale {
                entry.manifest.status = AgentStatus::Offline;
                demoted.push(id.clone());
            }
        }
        if !demoted.is_empty() {
            self.persist(&guard);
            warn!(target: "fabric.registry", count = demoted.len(), "stale agents demoted");
        }
        demoted
    }

    /// Per-status agent counts: `(online, degraded, offline, unknown)`.
    #[must_use]
    pub fn status_counts(&self) -> (usize, usize, usize, usize) {
        let guard = self.read();
        let mut counts = (0, 0, 0, 0);
        for entry in guard.values() {
            match entry.manifest.status {
                AgentStatus::Online => counts.0 += 1,
                AgentStatus::Degraded => counts.1 += 1,
                AgentStatus::Offline => counts.2 += 1,
                AgentStatus::Unknown => counts.3 += 1,
            }
        }
        counts
    }

    /// Total number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if no agents are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Append a call audit record to storage (durable variant only persists).
    pub fn append_call_log(&self, record: &CallLogRecord) {
        self.storage.append_call_log(record);
    }

    /// Append a health probe record to storage.
    pub fn append_health_record(&self, record: &HealthRecord) {
        self.storage.append_health(record);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, AgentEntry>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, AgentEntry>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, guard: &BTreeMap<String, AgentEntry>) {
        let manifests: Vec<AgentManifest> = guard.values().map(|e| e.manifest.clone()).collect();
        self.storage.persist_agents(&manifests);
    }
}

fn not_found(agent_id: &str) -> GatewayError {
    GatewayError::new(
        ErrorCode::AgentNotFound,
        format!("agent '{agent_id}' is not registered"),
    )
    .with_detail("agent_id", agent_id)
}
