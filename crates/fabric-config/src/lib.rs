// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration for the fabric gateway.
//!
//! [`GatewayConfig`] resolves in three layers, later layers winning:
//! built-in defaults, then the TOML file (when one is given), then `FABRIC_*`
//! environment variables. [`GatewayConfig::check`] separates hard errors
//! from advisory [`ConfigWarning`]s. The declarative agent manifest document
//! lives in [`manifest`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Declarative agent/tool manifest documents.
pub mod manifest;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use manifest::ManifestDocument;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while resolving or checking configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists check or read failed.
    #[error("cannot read config at {path}")]
    Unreadable {
        /// Path that was requested.
        path: String,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The file content is not valid TOML/JSON for the expected shape.
    #[error("cannot parse {path}: {detail}")]
    Malformed {
        /// Origin of the content (file path or a label like `<inline>`).
        path: String,
        /// Parser diagnostic.
        detail: String,
    },

    /// The configuration parsed but is semantically unusable.
    #[error("invalid configuration: {}", problems.join("; "))]
    Invalid {
        /// Every problem found, not just the first.
        problems: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory findings from [`GatewayConfig::check`]; the gateway still runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// No shared secret configured: the HTTP front admits every caller.
    Unauthenticated,
    /// A recommended optional setting is absent.
    MissingRecommended {
        /// Name of the setting.
        field: String,
        /// What running without it means.
        hint: String,
    },
    /// An interval is long enough to look like a mistake.
    LongInterval {
        /// Which setting.
        field: String,
        /// Value in seconds.
        secs: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::Unauthenticated => {
                f.write_str("auth.shared_secret is unset; the HTTP front admits every caller")
            }
            ConfigWarning::MissingRecommended { field, hint } => {
                write!(f, "consider setting '{field}': {hint}")
            }
            ConfigWarning::LongInterval { field, secs } => {
                write!(f, "'{field}' = {secs}s looks unintentionally long")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level runtime configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct GatewayConfig {
    /// Socket address the HTTP front binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Path to the declarative agent manifest document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<String>,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthSection,

    /// Registry settings.
    #[serde(default)]
    pub registry: RegistrySection,

    /// Health probing settings.
    #[serde(default)]
    pub health: HealthSection,

    /// Message bus settings.
    #[serde(default)]
    pub bus: BusSection,

    /// Tool host settings.
    #[serde(default)]
    pub tools: ToolsSection,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8420".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: Some("info".into()),
            manifest_path: None,
            auth: AuthSection::default(),
            registry: RegistrySection::default(),
            health: HealthSection::default(),
            bus: BusSection::default(),
            tools: ToolsSection::default(),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct AuthSection {
    /// Shared secret for the PSK path. `None` disables authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,
}

/// Which registry storage variant to run.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistryStorageKind {
    /// In-memory registry seeded from the manifest document.
    #[default]
    Memory,
    /// Durable registry with JSON tables under `data_dir`.
    Durable,
}

/// Registry settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct RegistrySection {
    /// Storage variant.
    #[serde(default)]
    pub storage: RegistryStorageKind,

    /// Data directory for the durable variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

/// Health probing settings.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct HealthSection {
    /// Seconds between probe sweeps.
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Seconds without a heartbeat before an agent is demoted to offline.
    #[serde(default = "default_staleness")]
    pub staleness_secs: u64,
}

fn default_probe_interval() -> u64 {
    30
}

fn default_staleness() -> u64 {
    60
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval(),
            staleness_secs: default_staleness(),
        }
    }
}

/// Message bus settings.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct BusSection {
    /// Seconds after which an unacknowledged delivery becomes reclaimable.
    #[serde(default = "default_visibility")]
    pub visibility_horizon_secs: u64,

    /// Default blocking window for `receive` when the caller gives none.
    #[serde(default = "default_block_ms")]
    pub default_block_ms: u64,
}

fn default_visibility() -> u64 {
    30
}

fn default_block_ms() -> u64 {
    0
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            visibility_horizon_secs: default_visibility(),
            default_block_ms: default_block_ms(),
        }
    }
}

/// Tool host settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ToolsSection {
    /// Filesystem root the file tools are confined to. Defaults to the
    /// process working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_root: Option<String>,

    /// Substring patterns denied for the exec tool.
    #[serde(default)]
    pub denied_commands: Vec<String>,

    /// Environment variable name fragments hidden from the env tool.
    #[serde(default)]
    pub sensitive_env: Vec<String>,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Setters for each recognised `FABRIC_*` environment variable.
///
/// Environment always wins over the file, which wins over defaults.
const ENV_OVERRIDES: &[(&str, fn(&mut GatewayConfig, String))] = &[
    ("FABRIC_LISTEN_ADDR", |c, v| c.listen_addr = v),
    ("FABRIC_LOG_LEVEL", |c, v| c.log_level = Some(v)),
    ("FABRIC_SHARED_SECRET", |c, v| c.auth.shared_secret = Some(v)),
    ("FABRIC_MANIFEST_PATH", |c, v| c.manifest_path = Some(v)),
    ("FABRIC_DATA_DIR", |c, v| c.registry.data_dir = Some(v)),
];

/// Resolve the gateway configuration.
///
/// Defaults come first; the TOML file at `path` (if any) is layered over
/// them; recognised `FABRIC_*` environment variables are applied last.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = GatewayConfig::default();
    if let Some(path) = path {
        config = read_config_file(path)?;
    }
    for (name, apply) in ENV_OVERRIDES {
        if let Ok(value) = std::env::var(name) {
            apply(&mut config, value);
        }
    }
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let origin = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: origin.clone(),
        source,
    })?;
    GatewayConfig::from_toml(&origin, &text)
}

impl GatewayConfig {
    /// Parse configuration from TOML text.
    ///
    /// `origin` labels the content in diagnostics (a file path, or something
    /// like `"<inline>"` in tests).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] on a parse failure.
    pub fn from_toml(origin: &str, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Malformed {
            path: origin.to_string(),
            detail: e.to_string(),
        })
    }

    /// Check the configuration, separating hard errors from advisories.
    ///
    /// Hard errors (unusable log level or listen address, zero intervals,
    /// durable storage without a data dir) come back as
    /// [`ConfigError::Invalid`] listing every problem at once; everything
    /// soft comes back as warnings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when any hard problem is present.
    pub fn check(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        const KNOWN_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
        const LONG_INTERVAL_SECS: u64 = 600;

        let mut problems: Vec<String> = Vec::new();
        let mut warnings: Vec<ConfigWarning> = Vec::new();

        if let Some(level) = self.log_level.as_deref() {
            if !KNOWN_LEVELS.contains(&level) {
                problems.push(format!("unknown log_level '{level}'"));
            }
        }

        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            problems.push(format!("listen_addr '{}' is not a socket address", self.listen_addr));
        }

        match self.health.probe_interval_secs {
            0 => problems.push("health.probe_interval_secs must be positive".into()),
            secs if secs > LONG_INTERVAL_SECS => warnings.push(ConfigWarning::LongInterval {
                field: "health.probe_interval_secs".into(),
                secs,
            }),
            _ => {}
        }

        if self.health.staleness_secs == 0 {
            problems.push("health.staleness_secs must be positive".into());
        }
        if self.bus.visibility_horizon_secs == 0 {
            problems.push("bus.visibility_horizon_secs must be positive".into());
        }

        if self.registry.storage == RegistryStorageKind::Durable && self.registry.data_dir.is_none()
        {
            problems.push("registry.data_dir is required when registry.storage = \"durable\"".into());
        }

        if self.auth.shared_secret.is_none() {
            warnings.push(ConfigWarning::Unauthenticated);
        }
        if self.manifest_path.is_none() {
            warnings.push(ConfigWarning::MissingRecommended {
                field: "manifest_path".into(),
                hint: "the registry starts empty without a manifest document".into(),
            });
        }

        if problems.is_empty() {
            Ok(warnings)
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn from_inline(text: &str) -> GatewayConfig {
        GatewayConfig::from_toml("<inline>", text).unwrap()
    }

    #[test]
    fn defaults_pass_check_with_advisories_only() {
        let warnings = GatewayConfig::default().check().unwrap();
        assert!(warnings.contains(&ConfigWarning::Unauthenticated));
        assert!(
            warnings
                .iter()
                .any(|w| matches!(w, ConfigWarning::MissingRecommended { field, .. } if field == "manifest_path"))
        );
    }

    #[test]
    fn full_file_resolves_every_section() {
        let config = from_inline(
            r#"
            listen_addr = "0.0.0.0:9000"
            log_level = "debug"
            manifest_path = "agents.toml"

            [auth]
            shared_secret = "hunter2"

            [registry]
            storage = "durable"
            data_dir = "/var/lib/fabric"

            [health]
            probe_interval_secs = 15
            staleness_secs = 45

            [bus]
            visibility_horizon_secs = 20

            [tools]
            file_root = "/srv/files"
            denied_commands = ["rm -rf", "mkfs"]
            sensitive_env = ["SECRET", "TOKEN"]
            "#,
        );

        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.auth.shared_secret.as_deref(), Some("hunter2"));
        assert_eq!(config.registry.storage, RegistryStorageKind::Durable);
        assert_eq!(config.health.probe_interval_secs, 15);
        assert_eq!(config.bus.visibility_horizon_secs, 20);
        assert_eq!(config.tools.denied_commands.len(), 2);
        assert!(config.check().unwrap().is_empty());
    }

    #[test]
    fn check_collects_every_problem_at_once() {
        let mut config = GatewayConfig::default();
        config.log_level = Some("chatty".into());
        config.listen_addr = "not-an-addr".into();
        config.health.probe_interval_secs = 0;
        config.bus.visibility_horizon_secs = 0;

        let ConfigError::Invalid { problems } = config.check().unwrap_err() else {
            panic!("expected Invalid");
        };
        assert_eq!(problems.len(), 4, "{problems:?}");
    }

    #[test]
    fn durable_storage_needs_a_data_dir() {
        let mut config = GatewayConfig::default();
        config.registry.storage = RegistryStorageKind::Durable;
        let ConfigError::Invalid { problems } = config.check().unwrap_err() else {
            panic!("expected Invalid");
        };
        assert!(problems.iter().any(|p| p.contains("data_dir")));
    }

    #[test]
    fn very_long_probe_interval_is_only_advisory() {
        let mut config = GatewayConfig::default();
        config.health.probe_interval_secs = 3600;
        let warnings = config.check().unwrap();
        assert!(
            warnings
                .iter()
                .any(|w| matches!(w, ConfigWarning::LongInterval { secs: 3600, .. }))
        );
    }

    #[test]
    fn broken_toml_reports_its_origin() {
        let err = GatewayConfig::from_toml("gateway.toml", "listen_addr = [").unwrap_err();
        let ConfigError::Malformed { path, .. } = err else {
            panic!("expected Malformed");
        };
        assert_eq!(path, "gateway.toml");
    }

    #[test]
    fn missing_file_carries_the_io_source() {
        let err = load_config(Some(Path::new("/nonexistent/fabric.toml"))).unwrap_err();
        let ConfigError::Unreadable { source, .. } = err else {
            panic!("expected Unreadable");
        };
        assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn no_path_means_defaults() {
        // Env overlay still applies, so only assert fields with no override
        // set in the test environment.
        let config = load_config(None).unwrap();
        assert_eq!(config.bus.visibility_horizon_secs, 30);
        assert_eq!(config.health.probe_interval_secs, 30);
    }

    #[test]
    fn file_layer_is_read_through_load_config() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "listen_addr = \"127.0.0.1:7777\"").unwrap();
        let config = load_config(Some(f.path())).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:7777");
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let config = from_inline("listen_addr = \"127.0.0.1:1\"\nfuture_knob = 3\n");
        assert_eq!(config.listen_addr, "127.0.0.1:1");
    }
}
