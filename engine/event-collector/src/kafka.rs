//! Kafka-backed log client
//!
//! Wraps a threaded librdkafka producer. Records are batched by the library
//! (linger window, batch size, compression) and acknowledged individually
//! through delivery reports, so a batch that partially fails only fails the
//! records the broker rejected.

use crate::config::LogClientConfig;
use crate::error::AppendError;
use crate::event::{AppendOutcome, DeliveryReceipt};
use crate::log_client::LogClient;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;

/// Attempts to enqueue a record while the local producer queue is full
const QUEUE_FULL_ATTEMPTS: u32 = 3;
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(50);

/// Slack on top of `message.timeout.ms` before giving up on a delivery report
const DELIVERY_GRACE: Duration = Duration::from_secs(1);

/// Routes each delivery report to the worker waiting on it
pub struct DeliveryContext {
    timeout_ms: u64,
}

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = Box<Sender<AppendOutcome>>;

    fn delivery(&self, result: &DeliveryResult<'_>, waiter: Self::DeliveryOpaque) {
        let outcome = match result {
            Ok(message) => {
                Ok(DeliveryReceipt { partition: message.partition(), offset: message.offset() })
            }
            Err((KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut), _)) => {
                Err(AppendError::Timeout { timeout_ms: self.timeout_ms })
            }
            Err((err, _)) => Err(AppendError::transport(err.to_string())),
        };
        // The waiter may already have timed out
        let _ = waiter.send(outcome);
    }
}

type KafkaProducer = ThreadedProducer<DeliveryContext>;

/// Log client backed by a Kafka topic
pub struct KafkaLogClient {
    config: LogClientConfig,
    producer: RwLock<Option<Arc<KafkaProducer>>>,
}

impl KafkaLogClient {
    pub fn new(config: LogClientConfig) -> Self {
        Self { config, producer: RwLock::new(None) }
    }

    pub fn config(&self) -> &LogClientConfig {
        &self.config
    }

    /// librdkafka properties for the configured batching policy
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.config.bootstrap_servers)
            .set("acks", &self.config.acks)
            .set("retries", self.config.retries.to_string())
            .set("linger.ms", self.config.linger_ms.to_string())
            .set("batch.size", self.config.batch_size.to_string())
            .set("compression.type", self.config.compression.as_str())
            .set("message.timeout.ms", self.config.append_timeout_ms.to_string());
        client_config
    }

    fn current(&self) -> Option<Arc<KafkaProducer>> {
        self.producer.read().clone()
    }

    fn topic_metadata_ok(&self, producer: &KafkaProducer) -> bool {
        let timeout = Timeout::After(self.config.probe_timeout());
        match producer.client().fetch_metadata(Some(&self.config.topic), timeout) {
            Ok(metadata) => metadata.topics().iter().any(|topic| {
                topic.name() == self.config.topic
                    && topic.error().is_none()
                    && !topic.partitions().is_empty()
            }),
            Err(e) => {
                tracing::warn!("Metadata query for topic '{}' failed: {}", self.config.topic, e);
                false
            }
        }
    }
}

impl LogClient for KafkaLogClient {
    fn initialize(&self) -> bool {
        if self.current().is_some() {
            return true;
        }

        let context = DeliveryContext { timeout_ms: self.config.append_timeout_ms };
        let producer: KafkaProducer = match self.client_config().create_with_context(context) {
            Ok(producer) => producer,
            Err(e) => {
                tracing::error!("Failed to create Kafka producer: {}", e);
                return false;
            }
        };

        // Creation is lazy; confirm a broker answers before declaring ready
        let timeout = Timeout::After(self.config.probe_timeout());
        if let Err(e) = producer.client().fetch_metadata(Some(&self.config.topic), timeout) {
            tracing::error!(
                "Kafka unreachable at {}: {}",
                self.config.bootstrap_servers,
                e
            );
            return false;
        }

        let mut slot = self.producer.write();
        if slot.is_none() {
            *slot = Some(Arc::new(producer));
        }

        tracing::info!(
            "Kafka producer initialized for servers: {} (topic '{}')",
            self.config.bootstrap_servers,
            self.config.topic
        );
        true
    }

    fn append(&self, event_id: &str, payload: &[u8]) -> AppendOutcome {
        let producer = self.current().ok_or(AppendError::NotInitialized)?;
        let (waiter, delivery) = channel::bounded(1);

        let mut record = BaseRecord::with_opaque_to(&self.config.topic, Box::new(waiter))
            .key(event_id)
            .payload(payload);

        let mut attempt = 1;
        loop {
            match producer.send(record) {
                Ok(()) => break,
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), returned))
                    if attempt < QUEUE_FULL_ATTEMPTS =>
                {
                    attempt += 1;
                    record = returned;
                    std::thread::sleep(QUEUE_FULL_BACKOFF);
                }
                Err((e, _)) => return Err(AppendError::transport(e.to_string())),
            }
        }

        match delivery.recv_timeout(self.config.append_timeout() + DELIVERY_GRACE) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                Err(AppendError::Timeout { timeout_ms: self.config.append_timeout_ms })
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(AppendError::transport("delivery report dropped"))
            }
        }
    }

    fn probe_connectivity(&self) -> bool {
        match self.current() {
            Some(producer) => self.topic_metadata_ok(&producer),
            None => false,
        }
    }

    fn shutdown(&self) {
        let Some(producer) = self.producer.write().take() else {
            return;
        };

        if let Err(e) = producer.flush(Timeout::After(self.config.flush_timeout())) {
            tracing::warn!("Kafka flush incomplete at shutdown: {}", e);
        }
        tracing::info!("Kafka producer closed");
    }

    fn is_initialized(&self) -> bool {
        self.producer.read().is_some()
    }

    fn topic(&self) -> &str {
        &self.config.topic
    }
}
