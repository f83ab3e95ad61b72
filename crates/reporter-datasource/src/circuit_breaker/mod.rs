//! Circuit breakers for datasource-level fast-fail behavior
//!
//! Every outgoing datasource call runs through the breaker of its identity.
//! When a datasource keeps failing the breaker opens and subsequent calls
//! fail immediately until a cool-down has elapsed.
//!
//! States:
//! - Closed: Normal operation, calls pass through
//! - Open: Datasource is failing, calls fail immediately
//! - Half-Open: Testing if the datasource has recovered
//!
//! A closed breaker trips when `consecutive_failures >= failure_threshold`,
//! or when `requests >= min_requests` and the failure ratio reaches
//! `failure_ratio`. Counters reset on every transition.

mod breaker;
mod state;


pub use breaker::CircuitBreaker;
pub use state::{
    CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerSummary, CircuitState, Counts,
    Rejection,
};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// State reported for identities that never made a call.
pub const NOT_INITIALIZED: &str = "not_initialized";

/// Manages circuit breakers for all datasources
#[derive(Debug)]
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    total_trips: Arc<AtomicU64>,
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerManager {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
            total_trips: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Breaker for `identity`, created on first use.
    pub fn get_or_create(&self, identity: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(identity) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        let breaker = breakers.entry(identity.to_string()).or_insert_with(|| {
            info!(datasource = %identity, "Circuit breaker created");
            Arc::new(CircuitBreaker::new(identity, self.config.clone(), Arc::clone(&self.total_trips)))
        });
        Arc::clone(breaker)
    }

    fn get(&self, identity: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(identity).cloned()
    }

    /// Run `f` through the breaker of `identity`.
    pub async fn execute<F, Fut, T, E>(&self, identity: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitBreakerError>,
    {
        let breaker = self.get_or_create(identity);
        breaker.execute(f).await
    }

    /// `None` for identities without a breaker.
    pub fn get_state(&self, identity: &str) -> Option<CircuitState> {
        self.get(identity).map(|b| b.state())
    }

    /// `closed`, `open`, `half-open` or `not_initialized`.
    pub fn state(&self, identity: &str) -> String {
        self.get_state(identity)
            .map_or_else(|| NOT_INITIALIZED.to_string(), |s| s.as_str().to_string())
    }

    /// Zeroed for unknown identities.
    pub fn counts(&self, identity: &str) -> Counts {
        self.get(identity).map(|b| b.counts()).unwrap_or_default()
    }

    /// True unless the circuit is open. Unknown identities have not failed yet.
    pub fn is_healthy(&self, identity: &str) -> bool {
        self.get_state(identity) != Some(CircuitState::Open)
    }

    /// False when open, or half-open with every probe slot taken.
    pub fn should_allow_retry(&self, identity: &str) -> bool {
        let Some(breaker) = self.get(identity) else {
            return true;
        };
        match breaker.state() {
            CircuitState::Open => false,
            CircuitState::HalfOpen => breaker.counts().requests < self.config.max_probe_requests,
            CircuitState::Closed => true,
        }
    }

    /// Replace the breaker with a fresh one. No-op for unknown identities.
    pub fn reset(&self, identity: &str) {
        let mut breakers = self.breakers.write();
        if let Some(slot) = breakers.get_mut(identity) {
            info!(
                datasource = %identity,
                previous_state = %slot.state(),
                "Circuit breaker reset"
            );
            *slot = Arc::new(CircuitBreaker::new(
                identity,
                self.config.clone(),
                Arc::clone(&self.total_trips),
            ));
        }
    }

    pub fn total_trips(&self) -> u64 {
        self.total_trips.load(Ordering::Relaxed)
    }

    pub fn get_summary(&self) -> CircuitBreakerSummary {
        let breakers = self.breakers.read();
        let mut summary = CircuitBreakerSummary { total_trips: self.total_trips(), ..Default::default() };

        for breaker in breakers.values() {
            match breaker.state() {
                CircuitState::Closed => summary.closed += 1,
                CircuitState::Open => summary.open += 1,
                CircuitState::HalfOpen => summary.half_open += 1,
            }
        }
        summary
    }
}
