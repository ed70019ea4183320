//! # Event Collector
//!
//! Ingestion core for client analytics events.
//!
//! Events arrive from many concurrent callers, are enriched with a unique
//! identifier and server-side metadata, and are appended to a partitioned log
//! through a blocking, batching client. The blocking calls run on a small
//! bounded worker pool so callers only ever suspend on their own append.
//! Outcomes feed a sliding-window metrics aggregator, and a health monitor
//! reports whether new intake should be accepted.

pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod kafka;
pub mod lifecycle;
pub mod log_client;
pub mod metrics;
pub mod pool;
pub mod producer;

#[cfg(test)]
mod integration_tests;

pub use config::{CollectorConfig, CompressionType, HealthConfig, LogClientConfig, PoolConfig};
pub use error::{AppendError, CollectorError, PoolError, Result};
pub use event::{AppendOutcome, DeliveryReceipt, EnrichedEvent, Event, IngestReceipt};
pub use health::{HealthMonitor, HealthState, HealthStatus};
pub use kafka::KafkaLogClient;
pub use lifecycle::ProducerState;
pub use log_client::{InMemoryLogClient, LogClient, StoredRecord};
pub use metrics::{IngestMetrics, MetricsSnapshot};
pub use pool::BlockingPool;
pub use producer::EventProducer;

/// Current version of the event collector
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default time an append waits for broker acknowledgment
pub const DEFAULT_APPEND_TIMEOUT_MS: u64 = 10_000;

/// Default upper bound for a connectivity probe
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

/// Default number of pool workers
pub const DEFAULT_POOL_SIZE: usize = 4;
