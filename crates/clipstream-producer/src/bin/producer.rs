//! clipstream Producer Binary
//!
//! Publishes one event dump as a single session.
//!
//! # Environment Variables
//!
//! - `CLIPSTREAM_INPUT`: Dump file to read (default: data/data.dump)
//! - `CLIPSTREAM_BROKER`: Broker address (default: 127.0.0.1:4150)
//! - `CLIPSTREAM_TOPIC`: Topic to publish to (default: events)
//! - `CLIPSTREAM_BATCH_SIZE`: Records per batch (default: 100)
//! - `CLIPSTREAM_PROGRESS_INTERVAL`: Log progress every N lines (default: 10000)
//! - `RUST_LOG`: Log filter (default: info)
//!
//! # Example
//!
//! ```bash
//! cargo run --bin clipstream-producer -- --file data/data.dump --batch-size 100
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use clipstream_producer::{BatchFramer, FramerConfig};
use clipstream_transport::TcpTransport;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clipstream-producer")]
#[command(about = "Publish an event dump to the clipstream broker", long_about = None)]
struct Args {
    /// Event dump file, one record per line
    #[arg(short, long, env = "CLIPSTREAM_INPUT", default_value = "data/data.dump")]
    file: String,

    /// Broker address
    #[arg(long, env = "CLIPSTREAM_BROKER", default_value = "127.0.0.1:4150")]
    broker: String,

    /// Topic to publish to
    #[arg(long, env = "CLIPSTREAM_TOPIC", default_value = "events")]
    topic: String,

    /// Records per batch message
    #[arg(long, env = "CLIPSTREAM_BATCH_SIZE", default_value_t = 100)]
    batch_size: usize,

    /// Log progress every N lines (0 disables)
    #[arg(long, env = "CLIPSTREAM_PROGRESS_INTERVAL", default_value_t = 10_000)]
    progress_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("clipstream producer starting");
    info!("  Input: {}", args.file);
    info!("  Broker: {}", args.broker);
    info!("  Topic: {}", args.topic);
    info!("  Batch size: {}", args.batch_size);

    let file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("could not open input {}", args.file))?;

    let transport = Arc::new(TcpTransport::new(args.broker.clone()));
    let config = FramerConfig {
        topic: args.topic,
        batch_size: args.batch_size,
        progress_interval: args.progress_interval,
    };

    let stats = BatchFramer::new(transport, config)
        .run(BufReader::new(file))
        .await
        .with_context(|| format!("publishing to {} failed", args.broker))?;

    println!();
    println!("STATS:");
    println!("{}", stats);
    Ok(())
}
