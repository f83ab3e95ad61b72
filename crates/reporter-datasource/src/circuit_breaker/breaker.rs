//! Single-identity breaker.

use super::state::{CircuitBreakerConfig, CircuitBreakerError, CircuitState, Counts};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    counts: Counts,
    /// Bumped on every transition; results from older generations are dropped
    generation: u64,
    last_transition: Instant,
}

/// Breaker for one datasource identity.
#[derive(Debug)]
pub struct CircuitBreaker {
    identity: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    trips: Arc<AtomicU64>,
}

impl CircuitBreaker {
    pub(crate) fn new(identity: &str, config: CircuitBreakerConfig, trips: Arc<AtomicU64>) -> Self {
        Self {
            identity: identity.to_string(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                counts: Counts::default(),
                generation: 0,
                last_transition: Instant::now(),
            }),
            trips,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    pub fn counts(&self) -> Counts {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());
        inner.counts
    }

    /// Time since the last state transition.
    pub fn since_transition(&self) -> Duration {
        self.inner.lock().last_transition.elapsed()
    }

    /// Run `f` through the breaker.
    ///
    /// Rejected calls never invoke `f`. A call whose future is dropped or
    /// panics before completing counts as a failure.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitBreakerError>,
    {
        let generation = self.before_request()?;
        let mut guard = PendingRequest { breaker: self, generation, settled: false };

        let result = f().await;
        guard.settle(result.is_ok());
        result
    }

    pub(crate) fn before_request(&self) -> Result<u64, CircuitBreakerError> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());

        match inner.state {
            CircuitState::Open => Err(CircuitBreakerError::open(&self.identity)),
            CircuitState::HalfOpen if inner.counts.requests >= self.config.max_probe_requests => {
                Err(CircuitBreakerError::too_many_requests(&self.identity))
            },
            _ => {
                inner.counts.on_request();
                Ok(inner.generation)
            },
        }
    }

    pub(crate) fn after_request(&self, generation: u64, success: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);
        if inner.generation != generation {
            return;
        }

        match (inner.state, success) {
            (CircuitState::Closed, true) => inner.counts.on_success(),
            (CircuitState::Closed, false) => {
                inner.counts.on_failure();
                if self.config.ready_to_trip(&inner.counts) {
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            },
            (CircuitState::HalfOpen, true) => {
                inner.counts.on_success();
                self.transition(&mut inner, CircuitState::Closed, now);
            },
            (CircuitState::HalfOpen, false) => {
                inner.counts.on_failure();
                self.transition(&mut inner, CircuitState::Open, now);
            },
            (CircuitState::Open, _) => {},
        }
    }

    /// Open circuits move to half-open once the timeout has elapsed.
    fn refresh(&self, inner: &mut Inner, now: Instant) {
        if inner.state == CircuitState::Open
            && now.saturating_duration_since(inner.last_transition) >= self.config.timeout
        {
            self.transition(inner, CircuitState::HalfOpen, now);
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, now: Instant) {
        let from = inner.state;
        if from == to {
            return;
        }
        let counts = inner.counts;

        inner.state = to;
        inner.counts = Counts::default();
        inner.generation = inner.generation.wrapping_add(1);
        inner.last_transition = now;

        if to == CircuitState::Open {
            self.trips.fetch_add(1, Ordering::Relaxed);
            warn!(
                datasource = %self.identity,
                from = %from,
                to = %to,
                requests = counts.requests,
                failures = counts.total_failures,
                consecutive_failures = counts.consecutive_failures,
                "Circuit breaker opened"
            );
        } else {
            info!(datasource = %self.identity, from = %from, to = %to, "Circuit breaker state change");
        }
    }
}

/// Records a failure for a call that never settled.
struct PendingRequest<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl PendingRequest<'_> {
    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker.after_request(self.generation, success);
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.after_request(self.generation, false);
        }
    }
}
