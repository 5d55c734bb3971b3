mod bridge;
mod config;

use anyhow::Context;
use bridge::Bridge;
use hydrosense_shared::scheduler::Scheduler;
use hydrosense_shared::transport::{open_long_range, Radio, UdpRadio};
use hydrosense_shared::SystemClock;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = config::load(config_path.as_deref())?;

    info!("Relay node starting");
    info!("  Mesh: {}", config.mesh.bind_address);
    info!("  Long range: {:?}", config.long_range.mode);
    info!("  Clock failure policy: {:?}", config.clock_failure);

    let mesh = UdpRadio::mesh(&config.mesh.bind_address)
        .await
        .with_context(|| format!("failed to bind mesh radio on {}", config.mesh.bind_address))?;

    let radio = match open_long_range(&config.long_range).await {
        Ok(radio) => radio,
        Err(e) => {
            error!("Long-range radio init failed: {:#}", e);
            return Err(e);
        }
    };
    info!("Bridging {} -> {}", mesh.name(), radio.name());

    let mut bridge = Bridge::new(mesh, radio, SystemClock, config.clock_failure);
    let scheduler = Scheduler::new(config.yield_interval(), config.stats_interval());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    scheduler.run(&mut bridge, shutdown).await
}
