//! # Scanlink Server
//!
//! Broadcasts barcode scans to WebSocket clients.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (scans typed on stdin)
//! scanlink
//!
//! # Run with custom config
//! scanlink --config /path/to/scanlink.toml
//!
//! # Run with environment variables
//! SCANLINK_PORT=8080 SCANLINK_HOST=0.0.0.0 scanlink
//!
//! # Show the effective configuration
//! scanlink --print-config
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use scanlink_core::SessionRegistry;
use scanlink_server::{config::Config, metrics, scanner, Server};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "scanlink", version, about = "Broadcasts barcode scans to WebSocket clients")]
struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long, env = "SCANLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to.
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanlink=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.validate()?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    tracing::info!("Starting Scanlink server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {}", e);
        }
    }

    // The scanner must be usable before anything is served.
    let source = scanner::open_source(&config.scanner).await?;
    let grace = config.shutdown.grace();

    let server = Server::new(config, Arc::new(SessionRegistry::new()));
    server.start().await?;
    if let Some(source) = source {
        server.attach_source(source).await?;
    }

    let failed = server
        .failure_token()
        .await
        .context("Server stopped during startup")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown signal received");
        }
        () = failed.cancelled() => {
            tracing::error!("Listener failed, shutting down");
        }
    }

    server.stop(grace).await?;
    Ok(())
}
