//! Wedge utility: synthesizes discovery broadcasts for a radio that cannot
//! announce itself on this segment (VPN'd radios, routed subnets). SmartSDR
//! sees the broadcasts and connects to the radio's real address.

use anyhow::{Context, Result};
use clap::Parser;
use flexrelay_client::Rebroadcaster;
use flexrelay_proto::{FieldMap, Synthesizer};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "flexrelay-wedge",
    version,
    about = "Broadcasts synthesized FlexRadio discovery packets for an off-segment radio"
)]
struct Args {
    /// Radio model, e.g. FLEX-6600
    #[arg(long)]
    model: String,

    /// Radio serial number
    #[arg(long)]
    serial: String,

    /// Address SmartSDR should connect to
    #[arg(long)]
    ip: String,

    /// Radio nickname
    #[arg(long, default_value = "")]
    nickname: String,

    /// Operator callsign
    #[arg(long, default_value = "")]
    callsign: String,

    /// Radio firmware version string
    #[arg(long, default_value = "")]
    radio_version: String,

    /// Announced status
    #[arg(long, default_value = "Available")]
    status: String,

    /// Seconds between broadcasts
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,

    /// Broadcast destination address
    #[arg(long, default_value = "255.255.255.255")]
    broadcast_address: String,

    /// Discovery port
    #[arg(long, default_value_t = 4992)]
    port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn identity_fields(args: &Args) -> FieldMap {
    [
        ("model", args.model.as_str()),
        ("serial", args.serial.as_str()),
        ("version", args.radio_version.as_str()),
        ("nickname", args.nickname.as_str()),
        ("callsign", args.callsign.as_str()),
        ("ip", args.ip.as_str()),
        ("port", "4992"),
        ("status", args.status.as_str()),
    ]
    .into_iter()
    .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = %args.model,
        serial = %args.serial,
        ip = %args.ip,
        "FlexRelay wedge starting"
    );

    let caster = Rebroadcaster::new(&args.broadcast_address, args.port)
        .context("failed to open broadcast socket")?;
    let fields = identity_fields(&args);
    let mut synth = Synthesizer::new();
    let interval = Duration::from_secs(args.interval_secs.max(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, stopping wedge");
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {
                let packet = synth.encode(&fields);
                caster.send(&packet).await.context("broadcast failed")?;
                debug!(size = packet.len(), target = %caster.target(), "Discovery packet broadcast");
            }
        }
    }
}
