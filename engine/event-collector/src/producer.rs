//! Async event producer
//!
//! The public façade of the ingestion core. Each event is enriched with a
//! fresh identifier, serialized, and appended on the [`BlockingPool`]; the
//! caller's task suspends on the job's completion signal while other callers
//! keep submitting.

use crate::config::CollectorConfig;
use crate::error::{CollectorError, PoolError, Result};
use crate::event::{EnrichedEvent, Event, IngestReceipt};
use crate::kafka::KafkaLogClient;
use crate::lifecycle::{Lifecycle, ProducerState};
use crate::log_client::LogClient;
use crate::metrics::{IngestMetrics, MetricsSnapshot};
use crate::pool::BlockingPool;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Accepts events from many concurrent callers and relays them to the log
pub struct EventProducer {
    config: CollectorConfig,
    client: Arc<dyn LogClient>,
    pool: Arc<BlockingPool>,
    metrics: Arc<IngestMetrics>,
    lifecycle: Arc<Lifecycle>,
    // Set once by the first close; resolves when the close task finishes
    closed: Mutex<Option<watch::Receiver<bool>>>,
    probing: Arc<AtomicBool>,
}

impl EventProducer {
    /// Create a producer over `client` with its own metrics aggregator
    pub fn new(config: CollectorConfig, client: Arc<dyn LogClient>) -> Self {
        Self::with_metrics(config, client, Arc::new(IngestMetrics::new()))
    }

    /// Create a producer that records into a shared aggregator
    pub fn with_metrics(
        config: CollectorConfig,
        client: Arc<dyn LogClient>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        let pool = Arc::new(BlockingPool::new(config.pool.workers, config.pool.queue_capacity));
        Self {
            config,
            client,
            pool,
            metrics,
            lifecycle: Arc::new(Lifecycle::new()),
            closed: Mutex::new(None),
            probing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a producer backed by Kafka
    pub fn from_config(config: CollectorConfig) -> Self {
        let client = Arc::new(KafkaLogClient::new(config.log_client.clone()));
        Self::new(config, client)
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn state(&self) -> ProducerState {
        self.lifecycle.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ProducerState::Ready
    }

    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    pub fn topic(&self) -> &str {
        self.client.topic()
    }

    /// Appends waiting for or running on a worker
    pub fn queue_size(&self) -> usize {
        self.pool.pending()
    }

    /// Connect the log client; the producer stays not-ready on failure
    pub async fn initialize(&self) -> bool {
        match self.state() {
            ProducerState::Ready => return true,
            ProducerState::Draining | ProducerState::Closed => {
                warn!("Initialize called on a producer that is shutting down");
                return false;
            }
            ProducerState::Uninitialized => {}
        }

        let client = self.client.clone();
        let connected = match self.pool.run(move || client.initialize()).await {
            Ok(connected) => connected,
            Err(e) => {
                error!("Log client initialization could not be scheduled: {}", e);
                return false;
            }
        };

        if !connected {
            error!(
                "Failed to initialize log client for topic '{}'; producer not ready",
                self.client.topic()
            );
            return false;
        }

        // A close that began while connecting wins
        if self.lifecycle.mark_ready() || self.is_ready() {
            info!("Event producer ready (topic '{}')", self.client.topic());
            true
        } else {
            false
        }
    }

    /// Append one event and return its identifier
    pub async fn send_event(&self, event: Event) -> Result<Uuid> {
        self.ingest(event, None).await.map(|receipt| receipt.event_id)
    }

    /// Accept one event from the intake layer, enriching it with the caller address
    pub async fn ingest(&self, event: Event, client_addr: Option<IpAddr>) -> Result<IngestReceipt> {
        match self.state() {
            ProducerState::Ready => {}
            ProducerState::Uninitialized => return Err(CollectorError::NotInitialized),
            ProducerState::Draining | ProducerState::Closed => {
                return Err(CollectorError::ShuttingDown)
            }
        }

        let enriched = EnrichedEvent::new(event, client_addr);
        let event_id = enriched.event_id;
        let received_at = enriched.received_at;

        let payload = match enriched.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                self.metrics.record_failure();
                return Err(e);
            }
        };

        let key = enriched.key();
        let client = self.client.clone();
        let metrics = self.metrics.clone();

        // Outcome is recorded by the job itself so abandoned callers still count
        let job = self
            .pool
            .run(move || {
                let outcome = client.append(&key, &payload);
                match &outcome {
                    Ok(_) => metrics.record_success(),
                    Err(_) => metrics.record_failure(),
                }
                outcome
            })
            .await;

        match job {
            Ok(Ok(receipt)) => {
                debug!(
                    "Event {} ({}) appended at partition {} offset {}",
                    event_id, enriched.event.event_type, receipt.partition, receipt.offset
                );
                Ok(IngestReceipt::accepted(event_id, received_at))
            }
            Ok(Err(source)) => {
                warn!("Event {} failed: {}", event_id, source);
                Err(CollectorError::Append { event_id, source })
            }
            // Pool closed between the state check and admission
            Err(PoolError::Closed) => Err(CollectorError::ShuttingDown),
            Err(PoolError::WorkerLost) => {
                self.metrics.record_failure();
                error!("Worker lost while appending event {}", event_id);
                Err(PoolError::WorkerLost.into())
            }
        }
    }

    /// Probe the log; false when not ready or when the probe overruns its timeout
    ///
    /// Probes run on their own thread, never behind queued appends. At most one
    /// probe is outstanding; a call made while one is still running fails.
    pub async fn health_check(&self) -> bool {
        if !self.is_ready() {
            return false;
        }
        if self.probing.swap(true, Ordering::AcqRel) {
            debug!("Previous connectivity probe still running");
            return false;
        }

        let client = self.client.clone();
        let probing = self.probing.clone();
        let result = run_detached("collector-probe", move || {
            let connected = client.probe_connectivity();
            probing.store(false, Ordering::Release);
            connected
        });
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                self.probing.store(false, Ordering::Release);
                warn!("Failed to spawn probe thread: {}", e);
                return false;
            }
        };

        let probe_timeout = self.config.log_client.probe_timeout();
        match timeout(probe_timeout, result).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(_)) => false,
            Err(_) => {
                warn!("Connectivity probe exceeded {:?}", probe_timeout);
                false
            }
        }
    }

    /// Point-in-time metrics; fails once the producer is closed
    pub fn get_metrics(&self) -> Result<MetricsSnapshot> {
        if self.state() == ProducerState::Closed {
            return Err(CollectorError::Closed);
        }
        Ok(self.metrics.snapshot(self.pool.pending() as u64))
    }

    /// Stop intake, wait for in-flight appends, then release the log client
    ///
    /// The drain runs as a task owned by the producer, so dropping this future
    /// does not abandon it. Every call waits for that same task.
    pub async fn close(&self) {
        let mut closed = {
            let mut slot = self.closed.lock();
            match slot.as_ref() {
                Some(closed) => closed.clone(),
                None => {
                    let closed = self.spawn_close();
                    *slot = Some(closed.clone());
                    closed
                }
            }
        };

        if closed.wait_for(|done| *done).await.is_err() {
            error!("Close task ended without completing");
        }
    }

    fn spawn_close(&self) -> watch::Receiver<bool> {
        let (done_tx, done_rx) = watch::channel(false);
        self.lifecycle.begin_drain();

        let pool = self.pool.clone();
        let client = self.client.clone();
        let lifecycle = self.lifecycle.clone();
        tokio::spawn(async move {
            info!("Closing event producer ({} appends in flight)", pool.pending());
            pool.drain().await;

            let shutdown_client = client.clone();
            match run_detached("collector-shutdown", move || shutdown_client.shutdown()) {
                Ok(done) => {
                    if done.await.is_err() {
                        error!("Log client shutdown did not complete");
                    }
                }
                Err(e) => {
                    warn!("Failed to spawn shutdown thread ({}); shutting down inline", e);
                    client.shutdown();
                }
            }

            lifecycle.mark_closed();
            done_tx.send_replace(true);
            info!("Event producer closed");
        });

        done_rx
    }
}

/// Run a blocking call on a dedicated thread and resolve with its result
fn run_detached<F, T>(name: &str, f: F) -> std::io::Result<oneshot::Receiver<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (done_tx, done_rx) = oneshot::channel();
    std::thread::Builder::new().name(name.to_string()).spawn(move || {
        let _ = done_tx.send(f());
    })?;
    Ok(done_rx)
}
