//! clipstream Broker Binary
//!
//! Runs the topic broker that the producer publishes to and the consumer
//! subscribes from.
//!
//! # Environment Variables
//!
//! - `CLIPSTREAM_BROKER_ADDR`: Address to listen on (default: 127.0.0.1:4150)
//! - `CLIPSTREAM_MAX_IN_FLIGHT`: Unacknowledged messages per subscriber (default: 64)
//! - `RUST_LOG`: Log filter (default: info)
//!
//! # Example
//!
//! ```bash
//! CLIPSTREAM_BROKER_ADDR=0.0.0.0:4150 cargo run --bin clipstream-broker
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use clipstream_transport::{Broker, BrokerConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clipstream-broker")]
#[command(about = "clipstream topic broker", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "CLIPSTREAM_BROKER_ADDR", default_value = "127.0.0.1:4150")]
    bind: String,

    /// Maximum unacknowledged messages per subscriber
    #[arg(long, env = "CLIPSTREAM_MAX_IN_FLIGHT", default_value_t = 64)]
    max_in_flight: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("clipstream broker starting");
    info!("  Bind address: {}", args.bind);
    info!("  Max in flight: {}", args.max_in_flight);

    let broker = Broker::bind(BrokerConfig {
        bind_addr: args.bind.clone(),
        max_in_flight: args.max_in_flight.max(1),
    })
    .await
    .with_context(|| format!("failed to bind {}", args.bind))?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
        signal.cancel();
    });

    broker.run_until(shutdown).await?;
    info!("Broker stopped");
    Ok(())
}
