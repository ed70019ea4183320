// Sliding-window ingestion metrics

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Width of the events-per-minute window
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Process-wide ingestion counters
///
/// Totals and the acceptance window live behind one lock so an increment and
/// the prune that follows it are observed together by readers.
#[derive(Debug)]
pub struct IngestMetrics {
    state: Mutex<WindowState>,
    uptime_start: Instant,
}

#[derive(Debug, Default)]
struct WindowState {
    events_total: u64,
    errors_total: u64,
    accepted_at: VecDeque<Instant>,
}

impl WindowState {
    fn accept(&mut self, now: Instant) {
        self.events_total += 1;
        self.accepted_at.push_back(now);
        self.prune(now);
    }

    fn reject(&mut self, now: Instant) {
        self.errors_total += 1;
        self.prune(now);
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.accepted_at.front() {
            if now.saturating_duration_since(oldest) > RATE_WINDOW {
                self.accepted_at.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Point-in-time view of the ingestion counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub events_total: u64,
    pub errors_total: u64,
    pub events_per_minute: u64,
    pub queue_size: u64,
    pub uptime_seconds: u64,
}

impl IngestMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self { state: Mutex::new(WindowState::default()), uptime_start: Instant::now() }
    }

    /// Record an acknowledged append
    ///
    /// The timestamp is read under the lock so the window stays in time order.
    pub fn record_success(&self) {
        {
            let mut state = self.state.lock();
            state.accept(Instant::now());
        }
        ::metrics::increment_counter!("collector_events_total");
    }

    pub fn record_success_at(&self, now: Instant) {
        self.state.lock().accept(now);
        ::metrics::increment_counter!("collector_events_total");
    }

    /// Record a failed append
    pub fn record_failure(&self) {
        {
            let mut state = self.state.lock();
            state.reject(Instant::now());
        }
        ::metrics::increment_counter!("collector_errors_total");
    }

    pub fn record_failure_at(&self, now: Instant) {
        self.state.lock().reject(now);
        ::metrics::increment_counter!("collector_errors_total");
    }

    pub fn events_total(&self) -> u64 {
        self.state.lock().events_total
    }

    pub fn errors_total(&self) -> u64 {
        self.state.lock().errors_total
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self, queue_size: u64) -> MetricsSnapshot {
        self.snapshot_at(Instant::now(), queue_size)
    }

    /// Snapshot as of `now`; the window is pruned even without recent writes
    pub fn snapshot_at(&self, now: Instant, queue_size: u64) -> MetricsSnapshot {
        let mut state = self.state.lock();
        state.prune(now);

        MetricsSnapshot {
            events_total: state.events_total,
            errors_total: state.errors_total,
            events_per_minute: state.accepted_at.len() as u64,
            queue_size,
            uptime_seconds: now.saturating_duration_since(self.uptime_start).as_secs(),
        }
    }
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}
