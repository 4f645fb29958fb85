//! clipstream Reporting API Binary
//!
//! # Environment Variables
//!
//! - `CLIPSTREAM_DB`: SQLite database file written by the consumer (default: clipstream.db)
//! - `CLIPSTREAM_API_ADDR`: Address to listen on (default: 0.0.0.0:9999)
//! - `RUST_LOG`: Log filter (default: info)
//!
//! # Example
//!
//! ```bash
//! CLIPSTREAM_DB=./clipstream.db cargo run --bin clipstream-api
//! curl 'http://localhost:9999/users?country=SG'
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use clipstream_api::{create_router, serve, AppState};
use clipstream_store::SqliteStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clipstream-api")]
#[command(about = "Read-only reporting API over clipstream data", long_about = None)]
struct Args {
    /// SQLite database file
    #[arg(long, env = "CLIPSTREAM_DB", default_value = "clipstream.db")]
    db: String,

    /// Address to listen on
    #[arg(long, env = "CLIPSTREAM_API_ADDR", default_value = "0.0.0.0:9999")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("clipstream API starting");
    info!("  Database: {}", args.db);
    info!("  Address: {}", args.addr);

    clipstream_observability::init();

    let store = SqliteStore::open(&args.db)
        .await
        .with_context(|| format!("could not open database {}", args.db))?;

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;

    let router = create_router(AppState {
        store: Arc::new(store.clone()),
    });
    serve(listener, router, shutdown_signal())
        .await
        .context("API server failed")?;

    store.close().await;
    info!("API stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
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
}
