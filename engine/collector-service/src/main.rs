//! Event Collector Service
//!
//! Starts the ingestion core, keeps its health current in the background and
//! shuts down gracefully on Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use collector_service::{
    initialize_logging, load_configuration, run_intake, setup_signal_handlers, CollectorService,
    ShutdownHandle,
};

#[derive(Debug, Parser)]
#[command(name = "event-collector", version, about = "Relay analytics events into Kafka")]
struct Cli {
    /// TOML configuration file (defaults to $COLLECTOR_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the log level
    #[arg(long)]
    log_level: Option<String>,

    /// Override the log format (json, pretty, compact)
    #[arg(long)]
    log_format: Option<String>,

    /// Read JSON-lines events from standard input
    #[arg(long)]
    stdin: bool,

    /// Use an in-memory log instead of Kafka
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = load_configuration(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    config.service.stdin_intake |= cli.stdin;
    config.service.dry_run |= cli.dry_run;
    collector_service::config::validate_config(&config).context("Invalid command-line override")?;

    // Initialize logging; the guard flushes file output on exit
    let _log_guard = initialize_logging(&config.logging)?;

    info!("Starting Event Collector Service v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config.service.config_file {
        info!("Configuration loaded from {:?}", path);
    }

    // Setup signal handlers for graceful shutdown
    let shutdown = ShutdownHandle::new();
    setup_signal_handlers(shutdown.clone())?;
    info!("Signal handlers configured");

    let service = Arc::new(CollectorService::new(config, shutdown.clone())?);
    service.start().await.context("Failed to start collector service")?;

    if service.config.service.stdin_intake {
        let service = service.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let reader = tokio::io::BufReader::new(tokio::io::stdin());
            let result = run_intake(
                reader,
                service.producer.clone(),
                service.monitor.clone(),
                service.config.service.intake_concurrency,
            )
            .await;
            if let Err(e) = result {
                error!("Reading standard input failed: {}", e);
            }
            shutdown.trigger("standard input closed");
        });
    }

    // Wait for shutdown signal
    info!("Event Collector Service is running. Press Ctrl+C to shutdown gracefully.");
    shutdown.wait().await;

    service.shutdown().await?;

    info!("Event Collector Service shutdown complete");
    Ok(())
}
