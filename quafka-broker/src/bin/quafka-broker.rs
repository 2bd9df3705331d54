//! Quafka broker entry point.
//!
//! Usage: `quafka-broker [config.toml]`

use anyhow::Context;
use quafka_broker::{Broker, BrokerConfig};
use quafka_core::{config::ConfigLoader, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let loader = match std::env::args().nth(1) {
        Some(path) => ConfigLoader::new().with_file(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load().context("loading configuration")?;
    telemetry::init_logging(&config.logging).context("initializing logging")?;

    let mut broker = Broker::new(BrokerConfig::from(&config)).context("creating broker")?;
    let addr = broker.start().await.context("starting broker")?;
    info!("Quafka broker {} ready on {}", quafka_core::VERSION, addr);

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("Shutdown requested");
    broker.stop().await.context("stopping broker")?;
    Ok(())
}
