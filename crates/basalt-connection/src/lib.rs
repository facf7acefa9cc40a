//! Basalt Connection - Connection pooling and health checking
//!
//! This crate multiplexes a bounded number of physical database connections
//! across unbounded concurrent callers: blocking acquisition with per-call
//! timeouts, idle eviction, live resizing, and graceful shutdown.

pub mod health;
pub mod pool;

pub use health::{HealthStatus, HealthThresholds, PingError, PingResult, ping_connection};
pub use pool::{ConnectStrategy, ConnectionPool, PoolConfig, PoolStats, PooledConnection};
