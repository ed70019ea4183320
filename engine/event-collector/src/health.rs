// Health monitoring for the ingestion core

use crate::config::HealthConfig;
use crate::lifecycle::ProducerState;
use crate::producer::EventProducer;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Tri-state health reported to the intake layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unavailable,
}

impl HealthState {
    /// Whether new intake should be accepted
    pub fn is_available(&self) -> bool {
        matches!(self, HealthState::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unavailable => "unavailable",
        }
    }
}

/// Result of one health probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub timestamp: DateTime<Utc>,
    pub log_connected: bool,
    pub events_processed: u64,
}

impl HealthStatus {
    fn unavailable(events_processed: u64) -> Self {
        Self {
            status: HealthState::Unavailable,
            timestamp: Utc::now(),
            log_connected: false,
            events_processed,
        }
    }
}

/// Probes the producer's log connectivity and keeps the latest status
pub struct HealthMonitor {
    producer: Arc<EventProducer>,
    config: HealthConfig,
    status: RwLock<HealthStatus>,
}

impl HealthMonitor {
    pub fn new(producer: Arc<EventProducer>, config: HealthConfig) -> Self {
        Self { producer, config, status: RwLock::new(HealthStatus::unavailable(0)) }
    }

    /// Latest status; unavailable until the first check
    pub fn status(&self) -> HealthStatus {
        self.status.read().clone()
    }

    /// Probe now and replace the stored status
    pub async fn check(&self) -> HealthStatus {
        if self.config.reconnect
            && self.producer.state() == ProducerState::Uninitialized
            && self.producer.initialize().await
        {
            info!("Log client connected after retry");
        }

        let events_processed = self.producer.metrics().events_total();
        let status = match self.producer.state() {
            ProducerState::Ready => {
                let connected = self.producer.health_check().await;
                HealthStatus {
                    status: if connected { HealthState::Healthy } else { HealthState::Degraded },
                    timestamp: Utc::now(),
                    log_connected: connected,
                    events_processed,
                }
            }
            _ => HealthStatus::unavailable(events_processed),
        };

        let previous = std::mem::replace(&mut *self.status.write(), status.clone());
        if previous.status != status.status {
            match status.status {
                HealthState::Healthy => info!("Health changed: {} -> healthy", previous.status.as_str()),
                other => warn!("Health changed: {} -> {}", previous.status.as_str(), other.as_str()),
            }
        }

        status
    }

    /// Probe on the configured interval until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.probe_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Health monitor stopped");
    }
}
