//! Relay client binary: recover discovery packets and rebroadcast them on
//! the local segment.

use anyhow::{Context, Result};
use clap::Parser;
use flexrelay_client::{ClientChecks, FileLink, RelayLink};
use flexrelay_core::config::{AppConfig, ClientTransport, LogFormat};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "flexrelay-client",
    version,
    about = "Receives relayed FlexRadio discovery packets and rebroadcasts them locally"
)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml", env = "FLEXRELAY_CONFIG")]
    config: PathBuf,

    /// Override the relay server address (host:port)
    #[arg(short, long)]
    server: Option<String>,
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

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if args.config.exists() {
        AppConfig::from_config_builder(&args.config)
            .with_context(|| format!("failed to load {}", args.config.display()))?
    } else {
        AppConfig::default()
    };
    if let Some(server) = &args.server {
        config.client.server_address = server.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config);

    if !args.config.exists() {
        warn!(path = %args.config.display(), "Configuration file not found, using defaults");
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "FlexRelay discovery client"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            flag.store(true, Ordering::Relaxed);
        }
    });

    match config.client.transport {
        ClientTransport::Socket => {
            let mut link =
                RelayLink::new(&config, shutdown).context("failed to start relay link")?;
            link.set_health(Box::new(ClientChecks::new(link.status())));
            link.run().await.context("relay link failed")?;
        }
        ClientTransport::File => {
            let mut link = FileLink::new(&config, shutdown).context("failed to start file link")?;
            link.set_health(Box::new(ClientChecks::new(link.status())));
            link.run().await.context("file link failed")?;
        }
    }

    Ok(())
}
