//! Request logger service (v1)
//!
//! A small HTTP service whose every request passes through the request log
//! middleware.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                 REQUEST LOGGER                        │
//!   Client Request │  ┌─────────────┐   ┌──────────┐   ┌──────────────┐   │
//!   ───────────────┼─▶│ request log │──▶│ timeout  │──▶│   handlers   │   │
//!                  │  │   layer     │   │ + panics │   │ /health ...  │   │
//!                  │  └──────┬──────┘   └──────────┘   └──────┬───────┘   │
//!                  │         │                               │           │
//!   Client Response│  ┌──────▼──────┐                        │           │
//!   ◀──────────────┼──│ observed    │◀───────────────────────┘           │
//!                  │  │ body        │──▶ one record ──▶ logging backend  │
//!                  │  └─────────────┘                                    │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use request_logger::config::{load_config, ServiceConfig};
use request_logger::lifecycle::{signals::shutdown_signal, Shutdown};
use request_logger::observability::{logging, Logger};
use request_logger::HttpServer;

#[derive(Parser)]
#[command(name = "request-logger")]
#[command(about = "HTTP service with structured per-request logging", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        service = %config.request_log.service,
        record_format = ?config.observability.record_format,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.trigger();
        }
    });

    let logger = Logger::from_config(&config.observability);
    let server = HttpServer::new(config, logger);
    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
