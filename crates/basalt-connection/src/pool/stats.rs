//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of a connection pool's state
///
/// Taking a snapshot never mutates the pool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Total number of slots (idle + active + being created)
    pub(super) total: usize,
    /// Number of idle slots available in the pool
    pub(super) idle: usize,
    /// Number of slots currently in use
    pub(super) active: usize,
    /// Number of acquire requests waiting in the queue
    pub(super) waiting: usize,
    /// Current slot ceiling
    pub(super) max_size: usize,
    /// Queries served through the pool since construction
    pub(super) total_queries: u64,
    /// Running average query latency in milliseconds (0.0 before any query)
    pub(super) avg_latency_ms: f64,
    /// Acquires satisfied by an already-idle slot
    pub(super) pool_hits: u64,
    /// Acquires that had to create a slot or queue
    pub(super) pool_misses: u64,
}

impl PoolStats {
    /// Get the total number of slots
    pub fn total(&self) -> usize {
        self.total
    }

    /// Get the number of idle slots
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Get the number of active (in-use) slots
    pub fn active(&self) -> usize {
        self.active
    }

    /// Get the number of waiting acquire requests
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Get the current slot ceiling
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the cumulative query count
    pub fn total_queries(&self) -> u64 {
        self.total_queries
    }

    /// Get the running average query latency in milliseconds
    pub fn avg_latency_ms(&self) -> f64 {
        self.avg_latency_ms
    }

    /// Get the cumulative pool-hit count
    pub fn pool_hits(&self) -> u64 {
        self.pool_hits
    }

    /// Get the cumulative pool-miss count
    pub fn pool_misses(&self) -> u64 {
        self.pool_misses
    }

    /// Calculate pool utilization as a fraction (0.0 to 1.0)
    ///
    /// Returns 0.0 if the pool has no slots.
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.active as f64 / self.total as f64
        }
    }

    /// Check if every existing slot is in use
    pub fn is_full(&self) -> bool {
        self.idle == 0 && self.total > 0
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self {
            total: 0,
            idle: 0,
            active: 0,
            waiting: 0,
            max_size: 0,
            total_queries: 0,
            avg_latency_ms: 0.0,
            pool_hits: 0,
            pool_misses: 0,
        }
    }
}
