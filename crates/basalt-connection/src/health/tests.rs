//! Tests for connection health checking

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use basalt_core::{
    BasaltError, Connection, ExecResult, QueryResult, Result, Transaction, Value,
};

use super::ping::{PingError, ping_connection};
use super::status::{HealthStatus, HealthThresholds};

struct ProbeConnection {
    closed: AtomicBool,
    fail_queries: bool,
}

impl ProbeConnection {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            fail_queries: false,
        }
    }

    fn failing() -> Self {
        Self {
            closed: AtomicBool::new(false),
            fail_queries: true,
        }
    }
}

#[async_trait]
impl Connection for ProbeConnection {
    fn driver_name(&self) -> &str {
        "probe"
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        if self.fail_queries {
            return Err(BasaltError::Query("probe query failure".into()));
        }
        Ok(QueryResult::empty())
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<ExecResult> {
        Ok(ExecResult::default())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        Err(BasaltError::NotSupported(
            "transactions not supported by probe".into(),
        ))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn test_ping_measures_latency() {
    let conn = ProbeConnection::new();
    let latency = ping_connection(&conn).await.expect("ping");
    assert!(latency < Duration::from_secs(1));
}

#[tokio::test]
async fn test_ping_closed_connection() {
    let conn = ProbeConnection::new();
    conn.close().await.expect("close");

    let err = ping_connection(&conn).await.expect_err("ping fails");
    assert!(matches!(err, PingError::ConnectionClosed));
}

#[tokio::test]
async fn test_ping_query_failure() {
    let conn = ProbeConnection::failing();
    let err = ping_connection(&conn).await.expect_err("ping fails");
    assert!(matches!(err, PingError::QueryFailed(_)));
}

#[test]
fn test_status_classification() {
    assert_eq!(
        HealthStatus::from_latency(Duration::from_millis(50)),
        HealthStatus::Healthy
    );
    assert_eq!(
        HealthStatus::from_latency(Duration::from_millis(200)),
        HealthStatus::Degraded
    );
    assert_eq!(
        HealthStatus::from_latency(Duration::from_millis(1_000)),
        HealthStatus::Unhealthy
    );
}

#[test]
fn test_status_boundaries_are_inclusive() {
    assert_eq!(
        HealthStatus::from_latency(Duration::from_millis(100)),
        HealthStatus::Healthy
    );
    assert_eq!(
        HealthStatus::from_latency(Duration::from_millis(500)),
        HealthStatus::Degraded
    );
}

#[test]
fn test_status_custom_thresholds() {
    let thresholds = HealthThresholds::new(10, 50);
    assert_eq!(
        HealthStatus::from_latency_with_thresholds(Duration::from_millis(30), &thresholds),
        HealthStatus::Degraded
    );

    // A degraded bound below the healthy bound is clamped up to it.
    let clamped = HealthThresholds::new(100, 10);
    assert_eq!(clamped.degraded_threshold, Duration::from_millis(100));
}

#[test]
fn test_status_usability() {
    assert!(HealthStatus::Healthy.is_usable());
    assert!(HealthStatus::Degraded.is_usable());
    assert!(!HealthStatus::Unhealthy.is_usable());
    assert!(HealthStatus::Healthy.is_healthy());
    assert!(!HealthStatus::Degraded.is_healthy());
}
