// SPDX-License-Identifier: MIT OR Apache-2.0
//! Safety constraints shared by the sensitive builtin tools.
//!
//! Three rule families: filesystem confinement for the file tools, a
//! command-pattern denylist for the exec tool, and a sensitive-name filter
//! for the environment tool.

use crate::ToolError;
use std::path::{Component, Path, PathBuf};

/// Environment variable name fragments hidden by default.
const DEFAULT_SENSITIVE_ENV: &[&str] = &["KEY", "SECRET", "TOKEN", "PASSWORD", "CREDENTIAL"];

/// Command substrings denied by default.
const DEFAULT_DENIED_COMMANDS: &[&str] = &["rm -rf /", "mkfs", "shutdown", "reboot", ":(){"];

/// Safety rules handed to the builtin tools at startup.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    /// Root directory the file tools are confined to.
    pub file_root: PathBuf,
    /// Substring patterns denied for the exec tool.
    pub denied_commands: Vec<String>,
    /// Environment variable name fragments that are never revealed.
    pub sensitive_env: Vec<String>,
}

impl SafetyPolicy {
    /// A policy rooted at `file_root` with the default deny rules.
    #[must_use]
    pub fn rooted_at(file_root: impl Into<PathBuf>) -> Self {
        Self {
            file_root: file_root.into(),
            denied_commands: DEFAULT_DENIED_COMMANDS.iter().map(|s| (*s).to_string()).collect(),
            sensitive_env: DEFAULT_SENSITIVE_ENV.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Builder-style: extend the command denylist.
    #[must_use]
    pub fn deny_commands(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.denied_commands.extend(patterns);
        self
    }

    /// Builder-style: extend the sensitive-env filter.
    #[must_use]
    pub fn hide_env(mut self, fragments: impl IntoIterator<Item = String>) -> Self {
        self.sensitive_env.extend(fragments);
        self
    }

    /// Resolve a caller-supplied relative path inside the file root.
    ///
    /// Absolute paths and any `..` traversal are rejected before the path
    /// ever touches the filesystem.
    ///
    /// # Errors
    ///
    /// `PATH_DENIED` when the path escapes the root.
    pub fn resolve_path(&self, relative: &str) -> Result<PathBuf, ToolError> {
        let candidate = Path::new(relative);
        if candidate.is_absolute() {
            return Err(ToolError::new("PATH_DENIED", "absolute paths are not allowed"));
        }
        for component in candidate.components() {
            match component {
                Component::ParentDir => {
                    return Err(ToolError::new("PATH_DENIED", "path traversal is not allowed"));
                }
                Component::Prefix(_) | Component::RootDir => {
                    return Err(ToolError::new("PATH_DENIED", "absolute paths are not allowed"));
                }
                Component::CurDir | Component::Normal(_) => {}
            }
        }
        Ok(self.file_root.join(candidate))
    }

    /// Check a command line against the denylist.
    ///
    /// # Errors
    ///
    /// `COMMAND_DENIED` when any denylist pattern occurs in the line.
    pub fn check_command(&self, command_line: &str) -> Result<(), ToolError> {
        for pattern in &self.denied_commands {
            if command_line.contains(pattern.as_str()) {
                return Err(ToolError::new("COMMAND_DENIED", "command matches the denylist"));
            }
        }
        Ok(())
    }

    /// Returns `true` if the environment variable name must stay hidden.
    #[must_use]
    pub fn is_sensitive_env(&self, name: &str) -> bool {
        let upper = name.to_uppercase();
        self.sensitive_env
            .iter()
            .any(|fragment| upper.contains(&fragment.to_uppercase()))
    }
}
