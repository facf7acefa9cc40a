//! Health status classification

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Health status of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Connection is responding with good latency
    Healthy,
    /// Connection is working but latency is elevated
    Degraded,
    /// Connection latency is unacceptable
    Unhealthy,
}

impl HealthStatus {
    /// Classify health from latency using default thresholds
    /// (healthy < 100ms, degraded < 500ms).
    pub fn from_latency(latency: Duration) -> Self {
        Self::from_latency_with_thresholds(latency, &HealthThresholds::default())
    }

    /// Classify health from latency using custom thresholds
    pub fn from_latency_with_thresholds(latency: Duration, thresholds: &HealthThresholds) -> Self {
        if latency <= thresholds.healthy_threshold {
            HealthStatus::Healthy
        } else if latency <= thresholds.degraded_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Whether the connection is still usable (`Healthy` or `Degraded`)
    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    /// Whether the status is `Healthy`
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Healthy
    }
}

/// Latency thresholds for health classification
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Maximum latency considered healthy
    pub healthy_threshold: Duration,
    /// Maximum latency considered degraded (above this is unhealthy)
    pub degraded_threshold: Duration,
}

impl HealthThresholds {
    /// Create thresholds from millisecond bounds
    pub fn new(healthy_ms: u64, degraded_ms: u64) -> Self {
        Self {
            healthy_threshold: Duration::from_millis(healthy_ms),
            degraded_threshold: Duration::from_millis(degraded_ms.max(healthy_ms)),
        }
    }
}

impl Default for HealthThresholds {
    /// Default thresholds: healthy < 100ms, degraded < 500ms
    fn default() -> Self {
        Self {
            healthy_threshold: Duration::from_millis(100),
            degraded_threshold: Duration::from_millis(500),
        }
    }
}
