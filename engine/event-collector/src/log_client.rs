//! Log client trait and in-memory implementation

use crate::error::AppendError;
use crate::event::{AppendOutcome, DeliveryReceipt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Blocking client for the append-only log
///
/// Every method may block on the network and must only be called from the
/// execution pool. Implementations are shared by all pool workers and must
/// accept concurrent `append` calls.
pub trait LogClient: Send + Sync {
    /// Connect and configure batching; `false` if the log is unreachable
    fn initialize(&self) -> bool;

    /// Append one record and wait for its acknowledgment
    fn append(&self, event_id: &str, payload: &[u8]) -> AppendOutcome;

    /// Lightweight metadata query against the target topic
    fn probe_connectivity(&self) -> bool;

    /// Flush buffered records and release the connection; idempotent
    fn shutdown(&self);

    fn is_initialized(&self) -> bool;

    /// Target topic name
    fn topic(&self) -> &str;
}

/// A record stored by [`InMemoryLogClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub key: String,
    pub payload: Vec<u8>,
    pub offset: i64,
}

/// In-memory log client for tests and dry runs
#[derive(Debug)]
pub struct InMemoryLogClient {
    topic: String,
    records: Mutex<Vec<StoredRecord>>,
    initialized: AtomicBool,
    reachable: AtomicBool,
    fail_appends: AtomicBool,
    append_delay: Mutex<Option<Duration>>,
    probe_delay: Mutex<Option<Duration>>,
    releases: AtomicU64,
}

impl InMemoryLogClient {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            records: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
            fail_appends: AtomicBool::new(false),
            append_delay: Mutex::new(None),
            probe_delay: Mutex::new(None),
            releases: AtomicU64::new(0),
        }
    }

    /// Toggle whether initialize and probes can reach the log
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make every subsequent append fail with a transport error
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Simulated broker round-trip per append
    pub fn set_append_delay(&self, delay: Option<Duration>) {
        *self.append_delay.lock() = delay;
    }

    /// Simulated metadata round-trip per probe
    pub fn set_probe_delay(&self, delay: Option<Duration>) {
        *self.probe_delay.lock() = delay;
    }

    pub fn records(&self) -> Vec<StoredRecord> {
        self.records.lock().clone()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Number of times an initialized connection was released
    pub fn release_count(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }
}

impl LogClient for InMemoryLogClient {
    fn initialize(&self) -> bool {
        if !self.reachable.load(Ordering::SeqCst) {
            tracing::error!("In-memory log for topic '{}' is unreachable", self.topic);
            return false;
        }
        self.initialized.store(true, Ordering::SeqCst);
        true
    }

    fn append(&self, event_id: &str, payload: &[u8]) -> AppendOutcome {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(AppendError::NotInitialized);
        }

        let delay = *self.append_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(AppendError::transport("broker rejected record"));
        }

        let mut records = self.records.lock();
        let offset = records.len() as i64;
        records.push(StoredRecord { key: event_id.to_string(), payload: payload.to_vec(), offset });
        Ok(DeliveryReceipt { partition: 0, offset })
    }

    fn probe_connectivity(&self) -> bool {
        let delay = *self.probe_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.initialized.load(Ordering::SeqCst) && self.reachable.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        if self.initialized.swap(false, Ordering::SeqCst) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}
