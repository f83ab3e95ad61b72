//! Datasource Health Checking Module
//!
//! A single background task probes every datasource on a fixed interval:
//! - Snapshot the registry so no IO happens under its write lock
//! - Reconnect datasources that are unavailable, uninitialized or behind an
//!   open circuit (single attempt, breaker reset on success)
//! - Probe the rest with a lightweight catalog query and publish
//!   `available` / `degraded`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  HealthChecker                                               │
//! │  ├── registry: snapshot via get_all()                        │
//! │  ├── breakers: needs-healing input, probe wrapper            │
//! │  ├── connections: single-shot reconnect                      │
//! │  └── stop: CancellationToken                                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod checker;
mod types;


pub use checker::HealthChecker;
pub use types::{HealthCycleSummary, HealthReport, HealthSettings};
