//! Connection ping implementation

use std::time::{Duration, Instant};

use basalt_core::Connection;

/// Result of a ping operation
pub type PingResult = Result<Duration, PingError>;

/// Error that can occur during a ping operation
#[derive(Debug, Clone)]
pub enum PingError {
    /// The connection is closed
    ConnectionClosed,
    /// The probe query failed
    QueryFailed(String),
}

impl std::fmt::Display for PingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PingError::ConnectionClosed => write!(f, "Connection is closed"),
            PingError::QueryFailed(msg) => write!(f, "Ping query failed: {}", msg),
        }
    }
}

impl std::error::Error for PingError {}

/// Ping a connection to check that it is alive
///
/// Executes a minimal query (`SELECT 1`) and returns the round-trip time.
pub async fn ping_connection(conn: &dyn Connection) -> PingResult {
    if conn.is_closed() {
        return Err(PingError::ConnectionClosed);
    }

    let start = Instant::now();
    match conn.query("SELECT 1", &[]).await {
        Ok(_) => Ok(start.elapsed()),
        Err(e) => Err(PingError::QueryFailed(e.to_string())),
    }
}
