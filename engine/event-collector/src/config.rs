//! Configuration for the event collector
//!
//! Every field has a development default so the core runs with zero
//! configuration against a broker on `localhost:9092`.

use crate::error::{CollectorError, Result};
use crate::{DEFAULT_APPEND_TIMEOUT_MS, DEFAULT_POOL_SIZE, DEFAULT_PROBE_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Main configuration for the collector core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Log client (queue) configuration
    pub log_client: LogClientConfig,

    /// Execution pool configuration
    pub pool: PoolConfig,

    /// Health monitor configuration
    pub health: HealthConfig,
}

/// Configuration for the batching log client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogClientConfig {
    /// Comma-separated broker addresses
    pub bootstrap_servers: String,

    /// Target topic for enriched events
    pub topic: String,

    /// Acknowledgment mode ("all" waits for every in-sync replica)
    pub acks: String,

    /// Client-internal retry budget per record
    pub retries: u32,

    /// Linger window for coalescing appends into one batch
    pub linger_ms: u64,

    /// Maximum batch size in bytes
    pub batch_size: usize,

    /// Payload compression
    pub compression: CompressionType,

    /// How long an append waits for broker acknowledgment
    pub append_timeout_ms: u64,

    /// Upper bound for a connectivity probe
    pub probe_timeout_ms: u64,

    /// Upper bound for flushing buffered records on shutdown
    pub flush_timeout_ms: u64,
}

impl Default for LogClientConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            topic: "events".to_string(),
            acks: "all".to_string(),
            retries: 3,
            linger_ms: 10,
            batch_size: 16384,
            compression: CompressionType::Gzip,
            append_timeout_ms: DEFAULT_APPEND_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            flush_timeout_ms: 10_000,
        }
    }
}

impl LogClientConfig {
    pub fn append_timeout(&self) -> Duration {
        Duration::from_millis(self.append_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

/// Payload compression codec
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl CompressionType {
    /// Codec name as understood by the client library
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Gzip => "gzip",
            CompressionType::Snappy => "snappy",
            CompressionType::Lz4 => "lz4",
            CompressionType::Zstd => "zstd",
        }
    }
}

impl FromStr for CompressionType {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionType::None),
            "gzip" => Ok(CompressionType::Gzip),
            "snappy" => Ok(CompressionType::Snappy),
            "lz4" => Ok(CompressionType::Lz4),
            "zstd" => Ok(CompressionType::Zstd),
            other => Err(CollectorError::config(format!("Unknown compression type: {other}"))),
        }
    }
}

/// Configuration for the bounded execution pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads running blocking appends
    pub workers: usize,

    /// Jobs allowed to wait for a free worker before submitters are suspended
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { workers: DEFAULT_POOL_SIZE, queue_capacity: 1024 }
    }
}

/// Configuration for the health monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between background connectivity probes
    pub probe_interval_ms: u64,

    /// Retry `initialize` on each probe while the producer is not ready
    pub reconnect: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { probe_interval_ms: 30_000, reconnect: true }
    }
}

impl HealthConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

impl CollectorConfig {
    /// Build configuration from defaults overridden by process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an arbitrary key lookup (environment-style names)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log = &mut self.log_client;
        if let Some(servers) = lookup("KAFKA_BOOTSTRAP_SERVERS") {
            log.bootstrap_servers = servers;
        }
        if let Some(topic) = lookup("KAFKA_EVENTS_TOPIC") {
            log.topic = topic;
        }
        if let Some(acks) = lookup("KAFKA_ACKS") {
            log.acks = acks;
        }
        parse_into(&lookup, "KAFKA_RETRIES", &mut log.retries)?;
        parse_into(&lookup, "KAFKA_LINGER_MS", &mut log.linger_ms)?;
        parse_into(&lookup, "KAFKA_BATCH_SIZE", &mut log.batch_size)?;
        parse_into(&lookup, "KAFKA_COMPRESSION", &mut log.compression)?;
        parse_into(&lookup, "KAFKA_APPEND_TIMEOUT_MS", &mut log.append_timeout_ms)?;
        parse_into(&lookup, "KAFKA_PROBE_TIMEOUT_MS", &mut log.probe_timeout_ms)?;
        parse_into(&lookup, "KAFKA_FLUSH_TIMEOUT_MS", &mut log.flush_timeout_ms)?;

        parse_into(&lookup, "COLLECTOR_POOL_SIZE", &mut self.pool.workers)?;
        parse_into(&lookup, "COLLECTOR_QUEUE_CAPACITY", &mut self.pool.queue_capacity)?;

        parse_into(&lookup, "COLLECTOR_HEALTH_INTERVAL_MS", &mut self.health.probe_interval_ms)?;
        parse_into(&lookup, "COLLECTOR_HEALTH_RECONNECT", &mut self.health.reconnect)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let log = &self.log_client;
        if log.bootstrap_servers.trim().is_empty() {
            return Err(CollectorError::config("bootstrap_servers must not be empty"));
        }
        if log.topic.trim().is_empty() {
            return Err(CollectorError::config("topic must not be empty"));
        }
        match log.acks.as_str() {
            "all" | "-1" | "0" | "1" => {}
            other => return Err(CollectorError::config(format!("Invalid acks mode: {other}"))),
        }
        if log.append_timeout_ms == 0 {
            return Err(CollectorError::config("append_timeout_ms must be positive"));
        }
        if log.probe_timeout_ms == 0 {
            return Err(CollectorError::config("probe_timeout_ms must be positive"));
        }
        if self.pool.workers == 0 {
            return Err(CollectorError::config("pool.workers must be at least 1"));
        }
        if self.health.probe_interval_ms == 0 {
            return Err(CollectorError::config("health.probe_interval_ms must be positive"));
        }
        Ok(())
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| CollectorError::config(format!("Invalid value for {key}: {e}")))?;
    }
    Ok(())
}
