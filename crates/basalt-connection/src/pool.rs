//! Connection pooling for database connections
//!
//! The pool hands out a bounded number of connection slots to concurrent
//! callers. An acquire reuses an idle slot, creates a new one below the
//! ceiling, or joins a FIFO wait queue with its own timeout. Slots idle
//! beyond the configured floor are retired by per-slot timers, the ceiling
//! can be resized while callers hold connections, and `drain` winds the
//! whole pool down without stranding anyone.
//!
//! # Example
//!
//! ```ignore
//! use basalt_connection::pool::{ConnectStrategy, ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(2, 10)
//!     .with_acquire_timeout_ms(5_000)
//!     .with_idle_timeout_ms(300_000);
//!
//! let pool = ConnectionPool::new(config, ConnectStrategy::factory(my_factory)).await?;
//! let rows = pool.query("SELECT 1", &[]).await?;
//! ```

mod config;
mod pool;
mod slot;
mod stats;


pub use config::PoolConfig;
pub use pool::{ConnectStrategy, ConnectionPool, PooledConnection};
pub use stats::PoolStats;
