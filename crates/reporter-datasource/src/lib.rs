//! # Reporter Datasource
//!
//! Runtime subsystem that lets the report generator talk to a configurable set
//! of heterogeneous external databases and keep running when some of them are
//! unreachable.
//!
//! ## Architecture
//!
//! ```text
//! config ──► DatasourceRegistry ◄── ConnectionManager (connect + retry)
//!                  ▲       ▲                 ▲
//!                  │       │                 │
//!          QueryService  HealthChecker ──────┘
//!                  │       │
//!                  ▼       ▼
//!          CircuitBreakerManager ──► driver::{postgres, mongo}
//!                  │
//!                  ▼
//!            SchemaResolver
//! ```
//!
//! The registry owns every handle, the breaker manager owns every breaker;
//! callers only ever receive copies.

#![allow(
    clippy::significant_drop_tightening,
    reason = "RwLock guards in async code require careful lifetime management"
)]
#![allow(
    clippy::module_name_repetitions,
    reason = "Public types are re-exported at the crate root"
)]
// Test-only lints: allow panic!, println!, etc. in test code
#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::assertions_on_result_states
    )
)]

pub mod circuit_breaker;
pub mod config;
pub mod connect;
pub mod driver;
pub mod error;
pub mod health;
pub mod query;
pub mod redact;
pub mod registry;
pub mod resolver;
pub mod task;

#[cfg(test)]
pub(crate) mod test_support;

pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerManager, CircuitState, Counts,
};
pub use config::{load_datasource_configs, load_datasource_configs_from, RuntimeSettings};
pub use connect::{full_jitter, is_fatal, ConnectionManager, RetrySettings};
pub use driver::{Connector, DriverError, NativeConnector, Repository, TableQuery};
pub use error::{DatasourceError, DatasourceResult};
pub use health::{HealthChecker, HealthCycleSummary, HealthReport, HealthSettings};
pub use query::QueryService;
pub use redact::redact_connection_string;
pub use registry::{DatasourceHandle, DatasourceRegistry, RegisteredIdentities};
pub use resolver::{AmbiguityError, ResolveError, SchemaResolver, TableReference};
