//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a connection pool
///
/// Controls pool sizing, timeouts, and wait-queue backpressure. The maximum
/// size given here is the initial ceiling; it can be changed at runtime
/// through `ConnectionPool::resize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Floor of pre-warmed slots, never reaped below this count
    min_size: usize,
    /// Initial hard ceiling on total slots (idle + active)
    max_size: usize,
    /// Timeout in milliseconds when acquiring a connection from the pool
    acquire_timeout_ms: u64,
    /// Timeout in milliseconds before an idle slot beyond the floor is retired
    idle_timeout_ms: u64,
    /// Hard cap on queued acquire requests; beyond this, acquire fails fast
    max_wait_queue: usize,
    /// Bound in milliseconds on waiting for active slots during drain
    drain_timeout_ms: u64,
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes
    ///
    /// # Panics
    ///
    /// Panics if `min_size > max_size` or if `max_size` is 0.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        assert!(
            max_size > 0,
            "max_size must be greater than 0, got {}",
            max_size
        );
        assert!(
            min_size <= max_size,
            "min_size ({}) cannot exceed max_size ({})",
            min_size,
            max_size
        );

        Self {
            min_size,
            max_size,
            acquire_timeout_ms: 30_000, // 30 seconds default
            idle_timeout_ms: 600_000,   // 10 minutes default
            max_wait_queue: 64,
            drain_timeout_ms: 10_000,
        }
    }

    /// Set the acquire timeout in milliseconds
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Set the idle timeout in milliseconds
    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    /// Set the wait-queue cap
    pub fn with_max_wait_queue(mut self, max_wait_queue: usize) -> Self {
        self.max_wait_queue = max_wait_queue;
        self
    }

    /// Set the drain timeout in milliseconds
    pub fn with_drain_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.drain_timeout_ms = timeout_ms;
        self
    }

    /// Get the minimum pool size
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Get the initial maximum pool size
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the acquire timeout as a Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Get the idle timeout as a Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Get the wait-queue cap
    pub fn max_wait_queue(&self) -> usize {
        self.max_wait_queue
    }

    /// Get the drain timeout as a Duration
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - min_size: 1
    /// - max_size: 10
    /// - acquire_timeout: 30 seconds
    /// - idle_timeout: 10 minutes
    /// - max_wait_queue: 64
    /// - drain_timeout: 10 seconds
    fn default() -> Self {
        Self::new(1, 10)
    }
}
