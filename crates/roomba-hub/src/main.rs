//! roomba-hub command-line entry point.
//!
//! # Usage
//!
//! ```text
//! roomba-hub [--config <PATH>] [--broadcast <ADDR>] <COMMAND>
//!
//! Commands:
//!   run          Connect every paired robot and keep it synced until Ctrl-C
//!   scan         Probe the network and list the robots that answer
//!   discover     Scan, fetch missing credentials and save the results
//!   devices      List saved robots
//!   forget <ID>  Remove a saved robot
//!   init-config  Write a default config file if none exists
//! ```
//!
//! | Variable               | Description                               |
//! |------------------------|-------------------------------------------|
//! | `ROOMBA_HUB_CONFIG`    | Config file path (default: platform dir)  |
//! | `ROOMBA_HUB_BROADCAST` | Broadcast address for the discovery probe |
//! | `RUST_LOG`             | Log filter; overrides `hub.log_level`     |

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use roomba_core::DeviceRecord;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use roomba_hub::application::orchestrate::{Collaborators, Orchestrator, OrchestratorSettings};
use roomba_hub::infrastructure::hub::LoggingHub;
use roomba_hub::infrastructure::network::bootstrap::{
    BootstrapOptions, CredentialBootstrap, TlsTransport,
};
use roomba_hub::infrastructure::network::discovery::{BeaconScanner, ScanOptions};
use roomba_hub::infrastructure::session::DetachedConnector;
use roomba_hub::infrastructure::storage::config::{
    config_file_path, load_config_from, registry_path_for, save_config_to, AppConfig,
};
use roomba_hub::infrastructure::storage::registry::{DeviceStore, JsonFileStore};

/// Discovers Roomba robots, pairs them and keeps their records.
#[derive(Debug, Parser)]
#[command(name = "roomba-hub", version)]
struct Cli {
    /// Config file.  The device registry is stored next to it.
    #[arg(long, global = true, env = "ROOMBA_HUB_CONFIG")]
    config: Option<PathBuf>,

    /// Broadcast address for the discovery probe, overriding the config.
    #[arg(long, global = true, env = "ROOMBA_HUB_BROADCAST")]
    broadcast: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect every paired robot and keep it synced until Ctrl-C.
    Run,
    /// Probe the network and list the robots that answer.
    Scan,
    /// Scan, fetch missing credentials and save the results.
    Discover,
    /// List saved robots.
    Devices,
    /// Remove a saved robot.
    Forget {
        /// Device id (the part of the hostname after `Roomba-`).
        device_id: String,
    },
    /// Write a default config file if none exists.
    InitConfig,
}

struct AppContext {
    config: AppConfig,
    config_path: PathBuf,
    running: Arc<AtomicBool>,
}

impl AppContext {
    fn store(&self) -> JsonFileStore {
        JsonFileStore::new(registry_path_for(&self.config_path))
    }

    fn scanner(&self) -> anyhow::Result<BeaconScanner> {
        let options = ScanOptions::from_config(&self.config.discovery)
            .context("invalid discovery settings")?;
        Ok(BeaconScanner::new(options, Arc::clone(&self.running)))
    }

    fn orchestrator(&self) -> anyhow::Result<Orchestrator> {
        let bootstrap = &self.config.bootstrap;
        let transport = TlsTransport::new(
            bootstrap.port,
            std::time::Duration::from_secs(bootstrap.socket_timeout_secs),
        )
        .context("failed to build TLS client")?;
        let credentials =
            CredentialBootstrap::new(transport, BootstrapOptions::from(bootstrap), Arc::clone(&self.running));

        Ok(Orchestrator::new(
            Collaborators {
                scanner: Arc::new(self.scanner()?),
                credentials: Arc::new(credentials),
                connector: Arc::new(DetachedConnector),
                hub: Arc::new(LoggingHub),
                store: Arc::new(self.store()),
            },
            OrchestratorSettings::from(&self.config),
            Arc::clone(&self.running),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => config_file_path().context("no config path given and no platform config dir")?,
    };
    let mut config = load_config_from(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    if let Some(broadcast) = cli.broadcast.clone() {
        config.discovery.broadcast_address = Some(broadcast);
    }

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.hub.log_level)),
        )
        .init();

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let ctx = AppContext {
        config,
        config_path,
        running,
    };
    run(cli.command, &ctx).await
}

async fn run(command: Command, ctx: &AppContext) -> anyhow::Result<()> {
    match command {
        Command::Run => {
            let orchestrator = Arc::new(ctx.orchestrator()?);
            info!("roomba-hub running; press Ctrl-C to exit");
            orchestrator.run().await?;
            info!("roomba-hub stopped");
        }
        Command::Scan => {
            let scanner = ctx.scanner()?;
            let found = tokio::task::spawn_blocking(move || scanner.scan())
                .await
                .context("discovery worker failed")??;
            print_records(&found);
        }
        Command::Discover => {
            let orchestrator = ctx.orchestrator()?;
            orchestrator.load_known().await?;
            let found = orchestrator.discover_devices().await?;
            print_records(&found);
            info!(
                "saved {} robot(s) to {}",
                orchestrator.records().await.len(),
                ctx.store().path().display()
            );
        }
        Command::Devices => {
            let records = ctx.store().load()?;
            print_records(&records);
        }
        Command::Forget { device_id } => {
            let orchestrator = ctx.orchestrator()?;
            orchestrator.load_known().await?;
            if orchestrator.remove_device(&device_id).await? {
                println!("forgot {device_id}");
            } else {
                anyhow::bail!("no saved robot with id {device_id}");
            }
        }
        Command::InitConfig => {
            if ctx.config_path.exists() {
                println!("{} already exists", ctx.config_path.display());
            } else {
                save_config_to(&ctx.config_path, &AppConfig::default())?;
                println!("wrote {}", ctx.config_path.display());
            }
        }
    }
    Ok(())
}

fn print_records(records: &[DeviceRecord]) {
    if records.is_empty() {
        println!("no robots");
        return;
    }
    println!(
        "{:<18} {:<16} {:<16} {:<10} {}",
        "DEVICE ID", "NAME", "IP", "SKU", "PAIRED"
    );
    for r in records {
        println!(
            "{:<18} {:<16} {:<16} {:<10} {}",
            r.device_id,
            r.robot_name,
            r.ip,
            r.sku,
            if r.has_credential() { "yes" } else { "no" }
        );
    }
}
