// SPDX-License-Identifier: MIT OR Apache-2.0
//! fabricd — the fabric gateway daemon.

#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use fabric_adapters::{AdapterHealthProbe, HttpAdapterFactory};
use fabric_auth::Verifier;
use fabric_bus::MessageBus;
use fabric_config::{GatewayConfig, ManifestDocument, RegistryStorageKind};
use fabric_daemon::{AppState, build_app, stdio};
use fabric_pipeline::Gateway;
use fabric_registry::{AgentRegistry, FileStorage, HealthProber, MemoryStorage, RegistryStorage};
use fabric_tools::{SafetyPolicy, ToolHost};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fabricd", about = "Gateway brokering agent capabilities and messages")]
struct Args {
    /// Path to the gateway TOML configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address override (e.g. 127.0.0.1:8420).
    #[arg(long)]
    listen: Option<String>,

    /// Agent manifest document override.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Serve the local JSON front on stdin/stdout instead of HTTP.
    #[arg(long)]
    stdio: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = fabric_config::load_config(args.config.as_deref())
        .context("load gateway configuration")?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(manifest) = &args.manifest {
        config.manifest_path = Some(manifest.display().to_string());
    }

    init_tracing(config.log_level.as_deref());

    for warning in config.check().context("check configuration")? {
        warn!(target: "fabricd", %warning, "configuration warning");
    }

    let gateway = wire_gateway(&config).context("wire gateway components")?;

    // Background health sweeps keep registry status honest.
    let prober = HealthProber::new(
        gateway.registry().clone(),
        Arc::new(AdapterHealthProbe::new(HttpAdapterFactory::new())),
        Duration::from_secs(config.health.probe_interval_secs),
        Duration::from_secs(config.health.staleness_secs),
    );
    tokio::spawn(prober.run());

    if args.stdio {
        info!(target: "fabricd", "serving local JSON front on standard streams");
        stdio::run(gateway.clone(), tokio::io::stdin(), tokio::io::stdout()).await;
    } else {
        let app = build_app(Arc::new(AppState {
            gateway: gateway.clone(),
        }));
        let listener = tokio::net::TcpListener::bind(&config.listen_addr)
            .await
            .with_context(|| format!("bind {}", config.listen_addr))?;
        info!(target: "fabricd", addr = %config.listen_addr, "HTTP front listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("serve HTTP front")?;
    }

    gateway.bus().shutdown().await;
    info!(target: "fabricd", "gateway stopped");
    Ok(())
}

fn init_tracing(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn wire_gateway(config: &GatewayConfig) -> anyhow::Result<Gateway> {
    let storage: Arc<dyn RegistryStorage> = match config.registry.storage {
        RegistryStorageKind::Memory => Arc::new(MemoryStorage),
        RegistryStorageKind::Durable => {
            let data_dir = config
                .registry
                .data_dir
                .as_deref()
                .context("registry.data_dir is required for durable storage")?;
            Arc::new(FileStorage::open(Path::new(data_dir)).context("open registry storage")?)
        }
    };

    let registry = AgentRegistry::new(storage);
    if let Some(path) = config.manifest_path.as_deref() {
        let document = ManifestDocument::load(Path::new(path)).context("load agent manifest")?;
        let count = document.agents.len();
        for agent in document.agents {
            registry
                .register(agent)
                .map_err(|e| anyhow::anyhow!("register agent: {e}"))?;
        }
        info!(target: "fabricd", count, "agents loaded from manifest");
    }

    let file_root = config
        .tools
        .file_root
        .clone()
        .unwrap_or_else(|| ".".to_string());
    let policy = SafetyPolicy::rooted_at(file_root)
        .deny_commands(config.tools.denied_commands.iter().cloned())
        .hide_env(config.tools.sensitive_env.iter().cloned());
    let tools = ToolHost::with_builtins(policy);

    let bus = MessageBus::new(Duration::from_secs(config.bus.visibility_horizon_secs));
    let verifier = Verifier::new(config.auth.shared_secret.clone());

    Ok(Gateway::new(
        registry,
        tools,
        bus,
        Arc::new(HttpAdapterFactory::new()),
        verifier,
    ))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!(target: "fabricd", "ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
    info!(target: "fabricd", "shutdown signal received");
}
