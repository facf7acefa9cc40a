//! Error types for basalt

use std::time::Duration;
use thiserror::Error;

/// Core error type for basalt operations
#[derive(Error, Debug)]
pub enum BasaltError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timed out waiting for a connection (waited {0:?})")]
    AcquireTimeout(Duration),

    #[error("Connection wait queue is full ({0} requests queued)")]
    QueueFull(usize),

    #[error("Pool is draining")]
    PoolDraining,

    #[error("Invalid pool size: {0} (must be at least 1)")]
    InvalidPoolSize(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

impl BasaltError {
    /// Whether this error signals pool exhaustion rather than a failure of
    /// the work itself.
    ///
    /// Exhaustion (`AcquireTimeout`, `QueueFull`) is backpressure: the caller
    /// can retry or shed load. Everything else needs its own handling, so the
    /// two classes must stay distinguishable.
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            BasaltError::AcquireTimeout(_) | BasaltError::QueueFull(_)
        )
    }
}

/// Result type alias for basalt operations
pub type Result<T> = std::result::Result<T, BasaltError>;
