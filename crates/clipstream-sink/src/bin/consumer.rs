//! clipstream Consumer Binary
//!
//! Subscribes to the events topic, persists every batch and recomputes the
//! leaderboard at the end of each session.
//!
//! # Environment Variables
//!
//! - `CLIPSTREAM_BROKER`: Broker address (default: 127.0.0.1:4150)
//! - `CLIPSTREAM_TOPIC`: Topic to consume (default: events)
//! - `CLIPSTREAM_DB`: SQLite database file (default: clipstream.db)
//! - `CLIPSTREAM_MAX_INFLIGHT_BATCHES`: Concurrent batch writes (default: 16)
//! - `CLIPSTREAM_WRITE_TIMEOUT_MS`: Timeout per INSERT attempt (default: 10000)
//! - `CLIPSTREAM_MAX_RETRIES`: Retries for transient store errors (default: 3)
//! - `CLIPSTREAM_RECOMPUTE_TIMEOUT_MS`: Leaderboard recompute timeout (default: 30000)
//! - `CLIPSTREAM_METRICS_ADDR`: Serve `/metrics` on this address (optional)
//! - `RUST_LOG`: Log filter (default: info)
//!
//! # Example
//!
//! ```bash
//! CLIPSTREAM_DB=./clipstream.db CLIPSTREAM_METRICS_ADDR=0.0.0.0:9101 \
//!   cargo run --bin clipstream-consumer
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use clipstream_sink::{Consumer, SinkConfig, WriterConfig};
use clipstream_store::SqliteStore;
use clipstream_transport::TcpTransport;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clipstream-consumer")]
#[command(about = "Persist clipstream events and maintain the leaderboard", long_about = None)]
struct Args {
    /// Broker address
    #[arg(long, env = "CLIPSTREAM_BROKER", default_value = "127.0.0.1:4150")]
    broker: String,

    /// Topic to consume
    #[arg(long, env = "CLIPSTREAM_TOPIC", default_value = "events")]
    topic: String,

    /// SQLite database file
    #[arg(long, env = "CLIPSTREAM_DB", default_value = "clipstream.db")]
    db: String,

    /// Maximum batch writes in flight
    #[arg(long, env = "CLIPSTREAM_MAX_INFLIGHT_BATCHES", default_value_t = 16)]
    max_inflight_batches: usize,

    /// Timeout per INSERT attempt in milliseconds
    #[arg(long, env = "CLIPSTREAM_WRITE_TIMEOUT_MS", default_value_t = 10_000)]
    write_timeout_ms: u64,

    /// Retries for transient store errors
    #[arg(long, env = "CLIPSTREAM_MAX_RETRIES", default_value_t = 3)]
    max_retries: usize,

    /// Leaderboard recompute timeout in milliseconds
    #[arg(long, env = "CLIPSTREAM_RECOMPUTE_TIMEOUT_MS", default_value_t = 30_000)]
    recompute_timeout_ms: u64,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "CLIPSTREAM_METRICS_ADDR")]
    metrics_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("clipstream consumer starting");
    info!("  Broker: {}", args.broker);
    info!("  Topic: {}", args.topic);
    info!("  Database: {}", args.db);
    info!("  Max in-flight batches: {}", args.max_inflight_batches);

    clipstream_observability::init();

    let store = SqliteStore::open(&args.db)
        .await
        .with_context(|| format!("could not open database {}", args.db))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    if let Some(addr) = &args.metrics_addr {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind metrics address {}", addr))?;
        info!("  Metrics: http://{}/metrics", addr);

        let router: axum::Router = clipstream_observability::create_metrics_router();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "Metrics server failed");
            }
        });
    }

    let config = SinkConfig {
        topic: args.topic,
        max_inflight_batches: args.max_inflight_batches.max(1),
        recompute_timeout_ms: args.recompute_timeout_ms,
        writer: WriterConfig {
            write_timeout_ms: args.write_timeout_ms,
            max_retries: args.max_retries,
            ..Default::default()
        },
    };

    let transport = Arc::new(TcpTransport::new(args.broker.clone()));
    let result = Consumer::new(transport, Arc::new(store.clone()), config)
        .run(shutdown.clone())
        .await
        .with_context(|| format!("consuming from {} failed", args.broker));

    shutdown.cancel();
    store.close().await;
    info!("Consumer stopped");
    result
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    token.cancel();
}
