mod cloud;
mod config;
mod connectivity;
mod relay;

use anyhow::Context;
use cloud::CloudClient;
use connectivity::{ConnectivityEvent, ConnectivityManager, Credentials, WifiLink};
use hydrosense_shared::scheduler::Scheduler;
use hydrosense_shared::transport::open_long_range;
use hydrosense_shared::Uptime;
use relay::Uplink;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = config::load(config_path.as_deref())?;
    let uptime = Uptime::start();

    info!("Central node starting");
    info!("  Long range: {:?}", config.long_range.mode);
    info!("  Interface: {}", config.network.interface);
    info!("  Cloud endpoint: {}", config.cloud.endpoint);

    let radio = match open_long_range(&config.long_range).await {
        Ok(radio) => radio,
        Err(e) => {
            error!("Long-range radio init failed: {:#}", e);
            return Err(e);
        }
    };

    let link = WifiLink::new(&config.network.interface, &config.network.sysfs_root)
        .with_program(&config.network.association_command);
    let credentials = Credentials::new(&config.network.ssid, &config.network.password);
    let connectivity = ConnectivityManager::new(link, credentials, &config.connectivity, uptime);
    let cloud = CloudClient::new(&config.cloud).context("cloud client init failed")?;
    info!("Uploading to {}", cloud.endpoint());

    let mut uplink = Uplink::new(radio, connectivity, cloud, uptime);
    match uplink.start().await {
        ConnectivityEvent::ConnectionFailed { reason, retry_at_ms } => {
            warn!(
                "Starting without network ({}), next attempt after {} ms",
                reason, retry_at_ms
            );
        }
        _ => info!("Connectivity: {:?}", uplink.connectivity_state()),
    }

    let scheduler = Scheduler::new(config.yield_interval(), config.stats_interval());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    scheduler.run(&mut uplink, shutdown).await
}
