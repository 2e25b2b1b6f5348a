// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistence variants for the registry.
//!
//! Two variants are contracted: an in-memory registry seeded from the
//! manifest document, and a durable variant with JSON tables under a data
//! directory. Either satisfies [`RegistryStorage`]; the pipeline is agnostic.

use chrono::{DateTime, Utc};
use fabric_core::AgentManifest;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, warn};
use uuid::Uuid;

use crate::health::HealthRecord;

/// A call audit record appended after each dispatched request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogRecord {
    /// Trace id of the call.
    pub trace_id: Uuid,
    /// `"agent"`, `"tool"`, or `"message"`.
    pub target_type: String,
    /// Agent id, tool id, or bus operation.
    pub target_id: String,
    /// Request summary (call name + arguments).
    pub request: serde_json::Value,
    /// Response summary (`ok` flag and error code when failed).
    pub response: serde_json::Value,
    /// When handling started.
    pub started_at: DateTime<Utc>,
    /// When handling completed.
    pub completed_at: DateTime<Utc>,
}

/// Storage behind the registry.
///
/// Implementations must be cheap to call from under the registry's writer
/// lock; failures are logged, never surfaced to callers.
pub trait RegistryStorage: Send + Sync {
    /// Load persisted agents at startup.
    fn load_agents(&self) -> Vec<AgentManifest>;

    /// Persist the full agent table after a mutation.
    fn persist_agents(&self, agents: &[AgentManifest]);

    /// Append a health probe record.
    fn append_health(&self, record: &HealthRecord);

    /// Append a call audit record.
    fn append_call_log(&self, record: &CallLogRecord);
}

/// No-op storage for the in-memory variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStorage;

impl RegistryStorage for MemoryStorage {
    fn load_agents(&self) -> Vec<AgentManifest> {
        Vec::new()
    }

    fn persist_agents(&self, _agents: &[AgentManifest]) {}

    fn append_health(&self, _record: &HealthRecord) {}

    fn append_call_log(&self, _record: &CallLogRecord) {}
}

/// Durable storage: JSON tables under a data directory.
///
/// Layout:
/// - `agents.json` — full agent table (manifests incl. capabilities/status)
/// - `health_checks.jsonl` — append-only probe history
/// - `call_logs.jsonl` — append-only call audit log
#[derive(Debug)]
pub struct FileStorage {
    agents_path: PathBuf,
    health_path: PathBuf,
    call_log_path: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) a durable store under `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn open(data_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            agents_path: data_dir.join("agents.json"),
            health_path: data_dir.join("health_checks.jsonl"),
            call_log_path: data_dir.join("call_logs.jsonl"),
        })
    }

    fn append_line<T: Serialize>(path: &Path, record: &T) {
        let line = match serde_json::to_string(record) {
            Ok(l) => l,
            Err(e) => {
                error!(target: "fabric.registry", error = %e, "failed to encode record");
                return;
            }
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            warn!(target: "fabric.registry", path = %path.display(), error = %e, "append failed");
        }
    }
}

impl RegistryStorage for FileStorage {
    fn load_agents(&self) -> Vec<AgentManifest> {
        let bytes = match std::fs::read(&self.agents_path) {
            Ok(b) => b,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_slice(&bytes) {
            Ok(agents) => agents,
            Err(e) => {
                error!(
                    target: "fabric.registry",
                    path = %self.agents_path.display(),
                    error = %e,
                    "failed to parse agents table; starting empty"
                );
                Vec::new()
            }
        }
    }

    fn persist_agents(&self, agents: &[AgentManifest]) {
        let bytes = match serde_json::to_vec_pretty(agents) {
            Ok(b) => b,
            Err(e) => {
                error!(target: "fabric.registry", error = %e, "failed to encode agents table");
                return;
            }
        };
        // Write-then-rename so a crash never leaves a torn table.
        let tmp = self.agents_path.with_extension("json.tmp");
        let result = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, &self.agents_path));
        if let Err(e) = result {
            warn!(
                target: "fabric.registry",
                path = %self.agents_path.display(),
                error = %e,
                "persist failed"
            );
        }
    }

    fn append_health(&self, record: &HealthRecord) {
        Self::append_line(&self.health_path, record);
    }

    fn append_call_log(&self, record: &CallLogRecord) {
        Self::append_line(&self.call_log_path, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AgentRegistry;
    use fabric_core::{AgentStatus, CapabilityDescriptor, EndpointSpec, RuntimeKind, Transport};
    use std::sync::Arc;

    fn manifest(id: &str) -> AgentManifest {
        AgentManifest {
            agent_id: id.into(),
            display_name: id.to_uppercase(),
            version: "1.0".into(),
            description: String::new(),
            runtime_kind: RuntimeKind::Native,
            endpoint: EndpointSpec {
                transport: Transport::Http,
                uri: "http://127.0.0.1:1".into(),
            },
            capabilities: vec![CapabilityDescriptor::named("reason")],
            tags: Default::default(),
            trust_tier: Default::default(),
            status: AgentStatus::Unknown,
            last_seen_at: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn durable_registry_survives_restart() {
        let tmp = tempfile::tempdir().unwrap();

        {
            let storage = Arc::new(FileStorage::open(tmp.path()).unwrap());
            let reg = AgentRegistry::new(storage);
            reg.register(manifest("persisted")).unwrap();
            reg.heartbeat("persisted").unwrap();
        }

        // A second registry over the same directory sees the agent.
        let storage = Arc::new(FileStorage::open(tmp.path()).unwrap());
        let reg = AgentRegistry::new(storage);
        let back = reg.get("persisted").unwrap();
        assert_eq!(back.agent_id, "persisted");
        assert_eq!(back.status, AgentStatus::Online);
    }

    #[test]
    fn health_and_call_logs_append_jsonl() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(tmp.path()).unwrap();

        storage.append_health(&HealthRecord {
            agent_id: "a".into(),
            status: AgentStatus::Online,
            latency_ms: Some(12),
            checked_at: Utc::now(),
        });
        storage.append_call_log(&CallLogRecord {
            trace_id: Uuid::new_v4(),
            target_type: "agent".into(),
            target_id: "a".into(),
            request: serde_json::json!({"name": "fabric.call"}),
            response: serde_json::json!({"ok": true}),
            started_at: Utc::now(),
            completed_at: Utc::now(),
        });

        let health = std::fs::read_to_string(tmp.path().join("health_checks.jsonl")).unwrap();
        assert_eq!(health.lines().count(), 1);
        let logs = std::fs::read_to_string(tmp.path().join("call_logs.jsonl")).unwrap();
        let line: serde_json::Value = serde_json::from_str(logs.lines().next().unwrap()).unwrap();
        assert_eq!(line["target_type"], "agent");
    }

    #[test]
    fn corrupt_agents_table_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("agents.json"), b"{not json").unwrap();
        let storage = FileStorage::open(tmp.path()).unwrap();
        assert!(storage.load_agents().is_empty());
    }
}
