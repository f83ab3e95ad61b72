//! Runtime tunables (timeouts, pool sizes, retry, breaker, health checks).
//!
//! All keys are optional; unparseable values are logged and ignored.

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::connect::RetrySettings;
use crate::health::HealthSettings;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Deadlines applied to driver operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timeouts {
    /// Connection open, including the initial ping
    pub connect: Duration,
    pub fast_query: Duration,
    /// Plain `IN`-filtered queries
    pub medium_query: Duration,
    /// Advanced-filter queries
    pub slow_query: Duration,
    pub schema_discovery: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            fast_query: Duration::from_secs(5),
            medium_query: Duration::from_secs(30),
            slow_query: Duration::from_secs(60),
            schema_discovery: Duration::from_secs(30),
        }
    }
}

/// Connection pool bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSettings {
    pub max_open: u32,
    pub max_idle: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self { max_open: 10, max_idle: 2 }
    }
}

/// Every tunable of the subsystem.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSettings {
    pub timeouts: Timeouts,
    pub pool: PoolSettings,
    pub retry: RetrySettings,
    pub breaker: CircuitBreakerConfig,
    pub health: HealthSettings,
}

impl RuntimeSettings {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build settings from `REPORTER_*` keys, keeping defaults for absent or
    /// malformed values.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| k.starts_with("REPORTER_"))
            .collect();
        let reader = Reader { env: &env };

        let mut settings = Self::default();

        let t = &mut settings.timeouts;
        reader.secs("REPORTER_CONNECT_TIMEOUT_SECS", &mut t.connect);
        reader.secs("REPORTER_QUERY_TIMEOUT_SECS", &mut t.fast_query);
        reader.secs("REPORTER_MEDIUM_QUERY_TIMEOUT_SECS", &mut t.medium_query);
        reader.secs("REPORTER_SLOW_QUERY_TIMEOUT_SECS", &mut t.slow_query);
        reader.secs("REPORTER_SCHEMA_DISCOVERY_TIMEOUT_SECS", &mut t.schema_discovery);

        reader.value("REPORTER_POOL_MAX_OPEN", &mut settings.pool.max_open);
        reader.value("REPORTER_POOL_MAX_IDLE", &mut settings.pool.max_idle);

        let r = &mut settings.retry;
        reader.value("REPORTER_CONNECT_MAX_RETRIES", &mut r.max_retries);
        reader.millis("REPORTER_CONNECT_INITIAL_BACKOFF_MS", &mut r.initial_backoff);
        reader.millis("REPORTER_CONNECT_MAX_BACKOFF_MS", &mut r.max_backoff);

        let b = &mut settings.breaker;
        reader.value("REPORTER_BREAKER_FAILURE_THRESHOLD", &mut b.failure_threshold);
        reader.value("REPORTER_BREAKER_MIN_REQUESTS", &mut b.min_requests);
        reader.value("REPORTER_BREAKER_FAILURE_RATIO", &mut b.failure_ratio);
        reader.value("REPORTER_BREAKER_MAX_PROBE_REQUESTS", &mut b.max_probe_requests);
        reader.secs("REPORTER_BREAKER_TIMEOUT_SECS", &mut b.timeout);

        let h = &mut settings.health;
        reader.secs("REPORTER_HEALTH_CHECK_INTERVAL_SECS", &mut h.interval);
        reader.secs("REPORTER_HEALTH_CHECK_INITIAL_DELAY_SECS", &mut h.initial_delay);
        reader.secs("REPORTER_HEALTH_PROBE_TIMEOUT_SECS", &mut h.probe_timeout);

        if !(0.0..=1.0).contains(&settings.breaker.failure_ratio) {
            warn!(
                ratio = settings.breaker.failure_ratio,
                "Breaker failure ratio out of range, using default"
            );
            settings.breaker.failure_ratio = CircuitBreakerConfig::default().failure_ratio;
        }
        if settings.pool.max_open == 0 {
            settings.pool.max_open = PoolSettings::default().max_open;
        }
        settings.pool.max_idle = settings.pool.max_idle.min(settings.pool.max_open);
        if settings.retry.max_backoff < settings.retry.initial_backoff {
            settings.retry.max_backoff = settings.retry.initial_backoff;
        }

        settings
    }
}

struct Reader<'a> {
    env: &'a HashMap<String, String>,
}

impl Reader<'_> {
    fn value<T: FromStr>(&self, key: &str, slot: &mut T) {
        let Some(raw) = self.env.get(key) else {
            return;
        };
        match raw.trim().parse::<T>() {
            Ok(parsed) => *slot = parsed,
            Err(_) => warn!(key = %key, value = %raw, "Ignoring unparseable setting"),
        }
    }

    fn secs(&self, key: &str, slot: &mut Duration) {
        let mut secs = slot.as_secs();
        self.value(key, &mut secs);
        *slot = Duration::from_secs(secs);
    }

    fn millis(&self, key: &str, slot: &mut Duration) {
        let mut millis = u64::try_from(slot.as_millis()).unwrap_or(u64::MAX);
        self.value(key, &mut millis);
        *slot = Duration::from_millis(millis);
    }
}
