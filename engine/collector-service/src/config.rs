//! Service configuration management

use anyhow::{Context, Result};
use event_collector::CollectorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Ingestion core configuration
    pub collector: CollectorConfig,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Configuration file the settings were loaded from
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Use an in-memory log instead of Kafka
    pub dry_run: bool,

    /// Read JSON-lines events from standard input
    pub stdin_intake: bool,

    /// Maximum events in flight from the stdin intake
    pub intake_concurrency: usize,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,

    /// Log file path (if None, logs to stdout)
    pub file: Option<PathBuf>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter
    pub enabled: bool,

    /// Metrics export port
    pub port: u16,

    /// Gauge refresh and snapshot log interval in milliseconds
    pub interval_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            config_file: None,
            dry_run: false,
            stdin_intake: false,
            intake_concurrency: 256,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServiceSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string(), file: None }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true, port: 9090, interval_ms: 10_000 }
    }
}

impl MetricsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ServiceConfig {
    /// Time allowed for the producer to close
    ///
    /// Never shorter than one in-flight append plus the final flush.
    pub fn close_timeout(&self) -> Duration {
        let log = &self.collector.log_client;
        let floor = log.append_timeout() + log.flush_timeout() + Duration::from_secs(1);
        self.service.shutdown_timeout().max(floor)
    }
}

/// Load configuration from `.env`, an optional TOML file and the environment
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let from_env = std::env::var("COLLECTOR_CONFIG").ok().map(PathBuf::from);
    let path = path.map(Path::to_path_buf).or(from_env);
    load_config_with(path.as_deref(), |key| std::env::var(key).ok())
}

/// Load configuration with an explicit variable lookup
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            tracing::debug!("Loading configuration from file: {:?}", path);
            let mut config = load_from_file(path)?;
            config.service.config_file = Some(path.to_path_buf());
            config
        }
        None => ServiceConfig::default(),
    };

    load_from_env(&mut config, &lookup)?;
    validate_config(&config)?;

    Ok(config)
}

/// Load configuration from a TOML file
fn load_from_file(path: &Path) -> Result<ServiceConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {:?}", path))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse configuration file: {:?}", path))
}

/// Apply environment overrides
fn load_from_env<F>(config: &mut ServiceConfig, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    config
        .collector
        .apply_overrides(lookup)
        .context("Invalid collector environment override")?;

    if let Some(level) = lookup("COLLECTOR_LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Some(format) = lookup("COLLECTOR_LOG_FORMAT") {
        config.logging.format = format;
    }

    if let Some(file) = lookup("COLLECTOR_LOG_FILE") {
        config.logging.file = Some(PathBuf::from(file));
    }

    if let Some(enabled) = lookup("COLLECTOR_METRICS_ENABLED") {
        config.metrics.enabled =
            enabled.parse().context("COLLECTOR_METRICS_ENABLED must be true or false")?;
    }

    if let Some(port) = lookup("COLLECTOR_METRICS_PORT") {
        config.metrics.port = port.parse().context("COLLECTOR_METRICS_PORT must be a port number")?;
    }

    if let Some(dry_run) = lookup("COLLECTOR_DRY_RUN") {
        config.service.dry_run =
            dry_run.parse().context("COLLECTOR_DRY_RUN must be true or false")?;
    }

    if let Some(secs) = lookup("COLLECTOR_SHUTDOWN_TIMEOUT_SECS") {
        config.service.shutdown_timeout_secs =
            secs.parse().context("COLLECTOR_SHUTDOWN_TIMEOUT_SECS must be a number")?;
    }

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    config.collector.validate().context("Invalid collector configuration")?;

    // Validate log level
    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level)),
    }

    // Validate log format
    match config.logging.format.as_str() {
        "json" | "pretty" | "compact" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    // Validate metrics port
    if config.metrics.enabled && config.metrics.port == 0 {
        return Err(anyhow::anyhow!("Invalid metrics port: {}", config.metrics.port));
    }

    if config.service.intake_concurrency == 0 {
        return Err(anyhow::anyhow!("intake_concurrency must be at least 1"));
    }

    Ok(())
}
