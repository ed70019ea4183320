//! Error types for the event collector

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Errors surfaced to callers of the event producer
#[derive(Error, Debug)]
pub enum CollectorError {
    /// The log client could not connect at startup
    #[error("Log client initialization failed: {0}")]
    Initialization(String),

    /// A single append failed after the client's own retries
    #[error("Append of event {event_id} failed: {source}")]
    Append {
        event_id: Uuid,
        #[source]
        source: AppendError,
    },

    /// `send_event` called before a successful `initialize`
    #[error("Event producer is not initialized")]
    NotInitialized,

    /// `send_event` called once `close` has begun
    #[error("Event producer is shutting down")]
    ShuttingDown,

    /// Operation attempted on a closed producer
    #[error("Event producer is closed")]
    Closed,

    /// Event failed intake validation
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Serialization of the enriched record failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Execution pool errors
    #[error("Execution pool error: {0}")]
    Pool(#[from] PoolError),
}

impl CollectorError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new invalid event error
    pub fn invalid_event(msg: impl Into<String>) -> Self {
        Self::InvalidEvent(msg.into())
    }

    /// Whether the failure came from an attempted append
    pub fn is_append_failure(&self) -> bool {
        matches!(self, Self::Append { .. })
    }
}

/// Cause of a failed append, as reported by the log client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppendError {
    #[error("no acknowledgment within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("log client not initialized")]
    NotInitialized,
}

impl AppendError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Errors raised by the bounded execution pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool is closed to new work")]
    Closed,

    #[error("worker exited before completing the job")]
    WorkerLost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_failure_classification() {
        let err = CollectorError::Append {
            event_id: Uuid::new_v4(),
            source: AppendError::Timeout { timeout_ms: 10_000 },
        };
        assert!(err.is_append_failure());
        assert!(err.to_string().contains("no acknowledgment within 10000ms"));

        assert!(!CollectorError::NotInitialized.is_append_failure());
        assert!(!CollectorError::ShuttingDown.is_append_failure());
    }

    #[test]
    fn test_pool_error_conversion() {
        let err: CollectorError = PoolError::Closed.into();
        assert!(matches!(err, CollectorError::Pool(PoolError::Closed)));
    }
}
