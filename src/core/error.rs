//! Error types for queue and pool operations.

use thiserror::Error;

/// Errors produced by [`TaskQueue`](crate::core::TaskQueue) operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Queue is at capacity and the caller declined to wait.
    #[error("queue full")]
    Full,
    /// Queue has been closed; no further items will be accepted or delivered.
    #[error("queue closed")]
    Closed,
    /// No item became available before the wait deadline.
    #[error("queue wait timed out")]
    Timeout,
}

/// Errors produced when starting an [`ElasticPool`](crate::core::ElasticPool).
#[derive(Debug, Error)]
pub enum PoolError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_display() {
        assert_eq!(format!("{}", QueueError::Full), "queue full");
        assert_eq!(format!("{}", QueueError::Closed), "queue closed");
        assert_eq!(format!("{}", QueueError::Timeout), "queue wait timed out");
    }

    #[test]
    fn test_pool_error_display() {
        let err = PoolError::InvalidConfig("max_workers must be greater than 0".into());
        assert_eq!(
            format!("{err}"),
            "invalid configuration: max_workers must be greater than 0"
        );
    }
}
