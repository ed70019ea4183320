//! Event Collector Service Library
//!
//! Process wiring for the event ingestion core: configuration loading,
//! logging, signal handling, the Prometheus exporter, background health
//! monitoring and a JSON-lines intake for development.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod intake;
pub mod logging;
pub mod service;
pub mod signals;

pub use config::ServiceConfig;
pub use intake::{run_intake, IntakeSummary};
pub use logging::initialize_logging;
pub use service::CollectorService;
pub use signals::{setup_signal_handlers, ShutdownHandle};

/// Load configuration from files and environment variables
pub fn load_configuration(path: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(path).context("Failed to load service configuration")
}
