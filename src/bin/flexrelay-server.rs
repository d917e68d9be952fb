//! Relay server binary: capture discovery broadcasts, fan them out.

use anyhow::{Context, Result};
use clap::Parser;
use flexrelay_core::config::{AppConfig, LogFormat};
use flexrelay_server::{RelayServer, ServerChecks};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "flexrelay-server",
    version,
    about = "Captures FlexRadio discovery broadcasts and relays them to remote clients"
)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml", env = "FLEXRELAY_CONFIG")]
    config: PathBuf,
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn load_config(path: &PathBuf) -> Result<AppConfig> {
    let config = if path.exists() {
        AppConfig::from_config_builder(path)
            .with_context(|| format!("failed to load {}", path.display()))?
    } else {
        AppConfig::default()
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    init_tracing(&config);

    if !args.config.exists() {
        warn!(path = %args.config.display(), "Configuration file not found, using defaults");
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "FlexRelay discovery server"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let mut server =
        RelayServer::new(&config, Arc::clone(&shutdown)).context("failed to start relay server")?;
    server.set_health(Box::new(ServerChecks::new(
        server.hub(),
        config.server.shared_file_path.clone(),
        config.server.stale_after(),
    )));

    server.run().await.context("relay server failed")?;
    Ok(())
}
