//! Health checking types.

use chrono::{DateTime, Utc};
use reporter_types::DatasourceStatus;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Configuration for the health checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSettings {
    /// Time between probe cycles
    pub interval: Duration,
    /// Wait before the first cycle so startup can settle
    pub initial_delay: Duration,
    /// Deadline for a single probe
    pub probe_timeout: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            initial_delay: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Health of one datasource as published to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: DatasourceStatus,
    /// `closed`, `open`, `half-open` or `not_initialized`
    pub circuit: String,
    pub initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (circuit: {})", self.status, self.circuit)
    }
}

/// Outcome counts of one probe cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthCycleSummary {
    pub healthy: usize,
    pub unhealthy: usize,
    /// Datasources brought back by a reconnection during the cycle
    pub healed: usize,
}

impl HealthCycleSummary {
    pub fn total(&self) -> usize {
        self.healthy + self.unhealthy + self.healed
    }
}
