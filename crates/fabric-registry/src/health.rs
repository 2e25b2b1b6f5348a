// SPDX-License-Identifier: MIT OR Apache-2.0
//! Background health probing.
//!
//! The prober sweeps online and degraded agents at a fixed cadence, asks
//! each agent's adapter for a health probe, feeds the result through the
//! registry's demotion ladder, and demotes agents whose heartbeat has gone
//! stale.

use crate::AgentRegistry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fabric_core::{AgentManifest, AgentStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One row of probe history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Probed agent.
    pub agent_id: String,
    /// Status observed by the probe.
    pub status: AgentStatus,
    /// Probe round-trip latency, if the probe completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// When the probe ran.
    pub checked_at: DateTime<Utc>,
}

/// Something that can probe an agent's health.
///
/// The adapter layer implements this; the registry crate stays free of any
/// protocol knowledge.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe the agent behind `manifest`. Returns the observed status.
    async fn probe(&self, manifest: &AgentManifest) -> AgentStatus;
}

/// Periodic health sweep over the registry.
pub struct HealthProber {
    registry: AgentRegistry,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    staleness: chrono::Duration,
}

impl HealthProber {
    /// Create a prober with the given cadence and staleness window.
    #[must_use]
    pub fn new(
        registry: AgentRegistry,
        probe: Arc<dyn HealthProbe>,
        interval: Duration,
        staleness: Duration,
    ) -> Self {
        Self {
            registry,
            probe,
            interval,
            staleness: chrono::Duration::from_std(staleness)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
        }
    }

    /// Run the sweep loop forever. Intended for `tokio::spawn`.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            target: "fabric.registry",
            interval_secs = self.interval.as_secs(),
            "health prober started"
        );
        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    /// One probe sweep: probe every dispatchable agent, then demote stale ones.
    pub async fn sweep_once(&self) {
        let candidates: Vec<AgentManifest> = self
            .registry
            .list(&crate::ListFilter::default())
            .into_iter()
            .filter(|m| m.status.is_dispatchable() || m.status == AgentStatus::Unknown)
            .collect();

        for manifest in candidates {
            let started = Instant::now();
            let observed = self.probe.probe(&manifest).await;
            let latency_ms = started.elapsed().as_millis() as u64;
            let success = observed == AgentStatus::Online;

            debug!(
                target: "fabric.registry",
                agent_id = %manifest.agent_id,
                ?observed,
                latency_ms,
                "probe result"
            );

            // The agent may have been deregistered mid-sweep.
            if let Ok(status) = self.registry.record_probe(&manifest.agent_id, success) {
                self.registry.append_health_record(&HealthRecord {
                    agent_id: manifest.agent_id.clone(),
                    status,
                    latency_ms: Some(latency_ms),
                    checked_at: Utc::now(),
                });
            }
        }

        self.registry.demote_stale(self.staleness);
    }
}
