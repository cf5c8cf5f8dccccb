//! forced — the FOrcE daemon.
//!
//! Single binary that assembles the orchestrator:
//! - Configuration (force.toml + CLI overrides)
//! - State store (redb)
//! - Tenant registry with its FIM and cloud bindings, declared in the
//!   config file or with `--fim`
//! - Job queue, dispatch loop and monitoring spawners
//! - Job intake as JSON lines on stdin/stdout
//!
//! # Usage
//!
//! ```text
//! forced run --config /etc/force/force.toml --data-dir /var/lib/force
//! forced run --fim fim-1=tcp/10.0.0.1:7447
//! forced check-config --config /etc/force/force.toml
//! ```

mod bindings;
mod intake;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use force_backend::SimulatedBackends;
use force_core::{DEFAULT_UUID, FimBinding, ForceConfig, parse_duration};
use force_orchestrator::Orchestrator;
use force_state::StateStore;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,forced=debug,force_orchestrator=debug";

#[derive(Parser)]
#[command(name = "forced", about = "FOrcE orchestrator daemon")]
struct Cli {
    /// Log as JSON objects instead of plain text.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator and read job requests from stdin.
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// System the requests are filed under.
        #[arg(long, default_value = DEFAULT_UUID)]
        system: String,

        /// Tenant the requests are filed under.
        #[arg(long, default_value = DEFAULT_UUID)]
        tenant: String,

        /// Bind a FIM to that tenant. Repeatable.
        #[arg(long = "fim", value_name = "ID=LOCATOR", value_parser = parse_fim_flag)]
        fims: Vec<(String, String)>,
    },
    /// Print the effective configuration and exit.
    CheckConfig {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Path to force.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the state store; overrides `[store] path`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    queue_capacity: Option<usize>,

    /// e.g. "10s", "500ms".
    #[arg(long, value_parser = parse_duration)]
    monitor_interval: Option<Duration>,
}

fn parse_fim_flag(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((id, locator)) if !id.is_empty() && !locator.is_empty() => {
            Ok((id.to_string(), locator.to_string()))
        }
        _ => Err(format!("expected ID=LOCATOR, got {s:?}")),
    }
}

impl ConfigArgs {
    /// The config file (or defaults) with the CLI overrides applied.
    fn load(&self) -> anyhow::Result<ForceConfig> {
        let mut config = match &self.config {
            Some(path) => ForceConfig::from_file(path)
                .map_err(|e| anyhow::anyhow!("load {}: {e}", path.display()))?,
            None => ForceConfig::default(),
        };
        if let Some(data_dir) = &self.data_dir {
            config.store.path = data_dir.join("force.redb");
        }
        if let Some(capacity) = self.queue_capacity {
            config.orchestrator.queue_capacity = capacity;
        }
        if let Some(interval) = self.monitor_interval {
            config.orchestrator.monitor_interval = interval;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            system,
            tenant,
            fims,
        } => {
            let mut config = config.load()?;
            config.fims.extend(fims.into_iter().map(|(id, locator)| FimBinding {
                id,
                locator,
                system: system.clone(),
                tenant: tenant.clone(),
            }));
            init_tracing(&config, cli.log_json)?;
            run(config, system, tenant).await
        }
        Command::CheckConfig { config } => {
            let config = config.load()?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

/// `RUST_LOG` first, then `[log] filter`, then the built-in default.
fn log_filter(config: &ForceConfig) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = config.log.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
    Ok(EnvFilter::try_new(directive)?)
}

fn init_tracing(config: &ForceConfig, json: bool) -> anyhow::Result<()> {
    let filter = log_filter(config)?;
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn run(config: ForceConfig, system_id: String, tenant_id: String) -> anyhow::Result<()> {
    info!("FOrcE daemon starting");

    // ── State store ────────────────────────────────────────────────
    let db_path = &config.store.path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let store = StateStore::open(db_path)?;
    info!(path = ?db_path, "state store opened");

    // ── Orchestrator ───────────────────────────────────────────────
    let backends = Arc::new(SimulatedBackends::default());
    let orchestrator = Orchestrator::new(config.orchestrator.clone(), store, backends).await?;
    bindings::ensure_tenant(&orchestrator, &system_id, &tenant_id).await?;
    orchestrator.restore().await?;
    bindings::apply(&orchestrator, &config.fims, &config.clouds).await?;
    info!(
        queue_capacity = config.orchestrator.queue_capacity,
        monitor_interval = ?config.orchestrator.monitor_interval,
        "orchestrator ready"
    );

    // ── Shutdown signal ────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
        }
        let _ = signal_tx.send(true);
    });

    // ── Dispatch + intake ──────────────────────────────────────────
    let dispatcher = orchestrator.start(shutdown_rx.clone());

    let target = intake::Target {
        system_id,
        tenant_id,
    };
    let replies = intake::serve(
        &orchestrator,
        &target,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown_rx,
    )
    .await?;
    info!(replies, "job intake closed");

    orchestrator.shutdown().await;
    let _ = shutdown_tx.send(true);
    let _ = dispatcher.await;

    info!("FOrcE daemon stopped");
    Ok(())
}
