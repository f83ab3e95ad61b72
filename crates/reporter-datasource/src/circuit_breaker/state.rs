//! Circuit breaker state types and configuration

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Requests needed before the failure ratio is considered
    pub min_requests: u32,
    /// Failure ratio (0..=1) that opens the circuit once `min_requests` is reached
    pub failure_ratio: f64,
    /// Calls admitted while half-open
    pub max_probe_requests: u32,
    /// Time spent open before probing
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 15,
            min_requests: 10,
            failure_ratio: 0.5,
            max_probe_requests: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub(crate) fn ready_to_trip(&self, counts: &Counts) -> bool {
        if counts.consecutive_failures >= self.failure_threshold {
            return true;
        }
        counts.requests >= self.min_requests
            && counts.requests > 0
            && f64::from(counts.total_failures) / f64::from(counts.requests) >= self.failure_ratio
    }
}

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Datasource is failing - requests fail immediately
    Open,
    /// Testing recovery - limited requests allowed
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request counters of the current generation. Reset on every transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    pub(crate) fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    pub(crate) fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    pub(crate) fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }
}

/// Summary of circuit breaker states across all datasources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerSummary {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
    pub total_trips: u64,
}

/// Sentinel carried by every breaker rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("circuit breaker is open")]
    Open,
    #[error("too many requests")]
    TooManyRequests,
}

/// A call refused by the breaker without reaching the datasource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitBreakerError {
    #[error("datasource {identity} is currently unavailable (circuit open)")]
    Open {
        identity: String,
        #[source]
        source: Rejection,
    },

    #[error("datasource {identity} is recovering (too many requests)")]
    TooManyRequests {
        identity: String,
        #[source]
        source: Rejection,
    },
}

impl CircuitBreakerError {
    pub(crate) fn open(identity: &str) -> Self {
        Self::Open { identity: identity.to_string(), source: Rejection::Open }
    }

    pub(crate) fn too_many_requests(identity: &str) -> Self {
        Self::TooManyRequests { identity: identity.to_string(), source: Rejection::TooManyRequests }
    }

    pub fn rejection(&self) -> Rejection {
        match self {
            Self::Open { source, .. } | Self::TooManyRequests { source, .. } => *source,
        }
    }

    pub fn identity(&self) -> &str {
        match self {
            Self::Open { identity, .. } | Self::TooManyRequests { identity, .. } => identity,
        }
    }
}
