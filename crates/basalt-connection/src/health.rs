//! Health checking for database connections
//!
//! Provides a lightweight liveness probe (a minimal round-trip query) and
//! latency-based status classification.
//!
//! # Example
//!
//! ```ignore
//! use basalt_connection::health::{HealthStatus, ping_connection};
//!
//! let latency = ping_connection(&*connection).await?;
//! let status = HealthStatus::from_latency(latency);
//! ```

mod ping;
mod status;

#[cfg(test)]
mod tests;

pub use ping::{PingError, PingResult, ping_connection};
pub use status::{HealthStatus, HealthThresholds};
