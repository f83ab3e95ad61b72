//! Health checker implementation.

use super::types::{HealthCycleSummary, HealthReport, HealthSettings};
use crate::circuit_breaker::{CircuitBreakerManager, CircuitState};
use crate::connect::ConnectionManager;
use crate::driver::DriverError;
use crate::error::{DatasourceError, DatasourceResult};
use crate::registry::{DatasourceHandle, DatasourceRegistry};
use crate::task;
use futures::future::join_all;
use parking_lot::Mutex;
use reporter_types::{DatasourceKind, DatasourceStatus, DEFAULT_SCHEMA};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeOutcome {
    Healthy,
    Unhealthy,
    Healed,
}

/// Periodic prober and self-healer for every registered datasource.
pub struct HealthChecker {
    registry: Arc<DatasourceRegistry>,
    breakers: Arc<CircuitBreakerManager>,
    connections: Arc<ConnectionManager>,
    settings: HealthSettings,
    /// Stop signal for the background loop
    stop: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    reconnections: AtomicU64,
}

impl HealthChecker {
    pub fn new(
        registry: Arc<DatasourceRegistry>,
        breakers: Arc<CircuitBreakerManager>,
        connections: Arc<ConnectionManager>,
        settings: HealthSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            breakers,
            connections,
            settings,
            stop: CancellationToken::new(),
            task: Mutex::new(None),
            reconnections: AtomicU64::new(0),
        })
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    /// Spawn the background loop. Non-blocking; later calls are no-ops.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.task.lock();
        if slot.is_some() {
            debug!("Health checker already started");
            return;
        }

        let checker = Arc::clone(self);
        let stop = self.stop.clone();
        *slot = Some(task::spawn_with_cleanup(
            "health-checker",
            async move { checker.run().await },
            move |_| stop.cancel(),
        ));
        info!(
            interval_secs = self.settings.interval.as_secs(),
            initial_delay_secs = self.settings.initial_delay.as_secs(),
            "Health checker started"
        );
    }

    /// Signal the loop to exit. A probe already in flight completes; no new
    /// one starts. Safe to call without `start`.
    pub fn stop(&self) {
        if !self.stop.is_cancelled() {
            self.stop.cancel();
            info!("Health checker stopping");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Wait for the background loop to exit after [`HealthChecker::stop`].
    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Reconnection attempts made so far.
    pub fn reconnection_attempts(&self) -> u64 {
        self.reconnections.load(Ordering::Relaxed)
    }

    async fn run(self: Arc<Self>) {
        tokio::select! {
            biased;
            () = self.stop.cancelled() => return,
            () = tokio::time::sleep(self.settings.initial_delay) => {},
        }

        let mut ticker = interval_at(Instant::now() + self.settings.interval, self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                _ = ticker.tick() => {
                    let _ = task::recover("health-check-cycle", self.perform_health_checks()).await;
                },
            }
        }
        info!("Health checker stopped");
    }

    /// One probe cycle over a registry snapshot.
    pub async fn perform_health_checks(&self) -> HealthCycleSummary {
        let snapshot = self.registry.get_all().await;

        let outcomes = join_all(
            snapshot.into_iter().map(|(identity, handle)| async move {
                self.check_datasource(&identity, &handle).await
            }),
        )
        .await;

        let mut summary = HealthCycleSummary::default();
        for outcome in outcomes {
            match outcome {
                ProbeOutcome::Healthy => summary.healthy += 1,
                ProbeOutcome::Unhealthy => summary.unhealthy += 1,
                ProbeOutcome::Healed => summary.healed += 1,
            }
        }

        if summary.unhealthy > 0 {
            warn!(healthy = summary.healthy, unhealthy = summary.unhealthy, healed = summary.healed, "Health check cycle complete");
        } else {
            info!(healthy = summary.healthy, unhealthy = summary.unhealthy, healed = summary.healed, "Health check cycle complete");
        }
        summary
    }

    async fn check_datasource(&self, identity: &str, handle: &DatasourceHandle) -> ProbeOutcome {
        if self.needs_healing(identity, handle) {
            return match self.attempt_reconnection(identity).await {
                Ok(()) => ProbeOutcome::Healed,
                Err(_) => ProbeOutcome::Unhealthy,
            };
        }

        let result = self.ping(identity, handle).await;
        let healthy = result.is_ok();
        let error = result.err().map(|e| e.to_string());
        if let Some(err) = &error {
            warn!(datasource = %identity, error = %err, "Health probe failed");
        }

        if let Err(err) = self.registry.update(identity, |h| h.mark_probed(healthy, error)).await {
            warn!(datasource = %identity, error = %err, "Failed to publish probe result");
        }

        if healthy {
            ProbeOutcome::Healthy
        } else {
            ProbeOutcome::Unhealthy
        }
    }

    /// Unavailable, uninitialized, or behind an open circuit.
    pub fn needs_healing(&self, identity: &str, handle: &DatasourceHandle) -> bool {
        handle.status() == DatasourceStatus::Unavailable
            || !handle.is_initialized()
            || self.breakers.get_state(identity) == Some(CircuitState::Open)
    }

    /// Single-shot reconnect. Resets the breaker when it succeeds.
    pub async fn attempt_reconnection(&self, identity: &str) -> DatasourceResult<()> {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
        self.registry.update(identity, DatasourceHandle::reset_attempts).await?;

        info!(datasource = %identity, "🔄 Attempting datasource reconnection");
        match self.connections.connect(identity).await {
            Ok(()) => {
                self.breakers.reset(identity);
                info!(datasource = %identity, "Datasource healed");
                Ok(())
            },
            Err(err) => {
                warn!(datasource = %identity, error = %err, "Reconnection failed");
                Err(err)
            },
        }
    }

    /// Catalog probe through the breaker of `identity`, bounded by the probe
    /// timeout.
    async fn ping(&self, identity: &str, handle: &DatasourceHandle) -> DatasourceResult<()> {
        let Some(driver) = handle.driver().cloned() else {
            return Err(DatasourceError::Unavailable(identity.to_string()));
        };
        let schemas = match handle.kind() {
            DatasourceKind::Relational if handle.schemas().is_empty() => {
                vec![DEFAULT_SCHEMA.to_string()]
            },
            DatasourceKind::Relational => handle.schemas().to_vec(),
            DatasourceKind::Document => Vec::new(),
            DatasourceKind::Unsupported(kind) => {
                return Err(DatasourceError::UnsupportedKind(kind.clone()));
            },
        };
        let timeout = self.settings.probe_timeout;

        self.breakers
            .execute(identity, || async move {
                match tokio::time::timeout(timeout, driver.get_schema(&schemas)).await {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(err)) => Err(DatasourceError::from(err)),
                    Err(_) => Err(DatasourceError::from(DriverError::Timeout {
                        operation: "health probe",
                        after: timeout,
                    })),
                }
            })
            .await
    }

    /// Health of every datasource, copied so callers can serialize freely.
    pub async fn get_health_status(&self) -> HashMap<String, HealthReport> {
        self.registry
            .get_all()
            .await
            .into_iter()
            .map(|(identity, handle)| {
                let report = HealthReport {
                    status: handle.status(),
                    circuit: self.breakers.state(&identity),
                    initialized: handle.is_initialized(),
                    last_error: handle.last_error().map(str::to_string),
                    last_attempt: handle.last_attempt(),
                    retry_count: handle.retry_count(),
                };
                (identity, report)
            })
            .collect()
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
