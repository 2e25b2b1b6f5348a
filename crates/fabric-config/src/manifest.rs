// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declarative agent/tool manifest documents.
//!
//! A manifest document seeds the registry at startup. The loader is
//! permissive: unknown fields are preserved on each agent manifest and
//! missing optional fields take defaults.

use crate::ConfigError;
use fabric_core::{AgentManifest, ToolDescriptor};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A declarative document listing agents and optionally tools.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ManifestDocument {
    /// Agents registered at startup.
    #[serde(default)]
    pub agents: Vec<AgentManifest>,

    /// Externally-provided tool descriptors (pass-through entries).
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

impl ManifestDocument {
    /// Load a manifest document from a TOML or JSON file, by extension.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing or unparseable, or if
    /// any agent manifest fails identifier validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let origin = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: origin.clone(),
            source,
        })?;

        let doc = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str::<Self>(&content).map_err(|e| ConfigError::Malformed {
                path: origin,
                detail: e.to_string(),
            })?
        } else {
            toml::from_str::<Self>(&content).map_err(|e| ConfigError::Malformed {
                path: origin,
                detail: e.to_string(),
            })?
        };

        doc.validate()?;
        Ok(doc)
    }

    /// Validate every agent entry and check id uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let mut seen = std::collections::BTreeSet::new();

        for agent in &self.agents {
            if let Err(e) = agent.validate() {
                problems.push(format!("agent '{}': {e}", agent.agent_id));
            }
            if !seen.insert(agent.agent_id.as_str()) {
                problems.push(format!("duplicate agent_id '{}'", agent.agent_id));
            }
        }

        for tool in &self.tools {
            if tool.tool_id.is_empty() {
                problems.push("tool with empty tool_id".into());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }
}
