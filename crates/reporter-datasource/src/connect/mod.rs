//! Connection bring-up with retry.
//!
//! A single attempt goes through [`DatasourceRegistry::connect_datasource`].
//! The retry loop classifies each failure: identity errors and fatal errors
//! stop immediately, everything else is retried with capped exponential
//! backoff until the attempt budget is spent.

mod backoff;


pub use backoff::{full_jitter, RetrySettings};

use crate::driver::Connector;
use crate::error::{DatasourceError, DatasourceResult};
use crate::registry::DatasourceRegistry;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Error fragments that make a connection failure non-retryable.
const FATAL_PATTERNS: &[&str] = &[
    "no such host",
    "lookup",
    "server misbehaving",
    "connection refused",
    "unsupported database type",
    "invalid connection string",
    "authentication failed",
    "authorization failed",
    "access denied",
];

/// Case-insensitive match against the fatal vocabulary.
pub fn is_fatal(message: &str) -> bool {
    let lower = message.to_lowercase();
    FATAL_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Brings datasources up through a [`Connector`].
pub struct ConnectionManager {
    registry: Arc<DatasourceRegistry>,
    connector: Arc<dyn Connector>,
    retry: RetrySettings,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(
        registry: Arc<DatasourceRegistry>,
        connector: Arc<dyn Connector>,
        retry: RetrySettings,
        connect_timeout: Duration,
    ) -> Self {
        Self { registry, connector, retry, connect_timeout }
    }

    pub fn registry(&self) -> &Arc<DatasourceRegistry> {
        &self.registry
    }

    pub fn retry_settings(&self) -> &RetrySettings {
        &self.retry
    }

    /// One attempt, no retry.
    pub async fn connect(&self, identity: &str) -> DatasourceResult<()> {
        self.registry
            .connect_datasource(identity, self.connector.as_ref(), self.connect_timeout)
            .await
    }

    /// Up to `max_retries + 1` attempts, sleeping between them. Returns
    /// promptly when `cancel` fires.
    pub async fn connect_with_retry(
        &self,
        identity: &str,
        cancel: &CancellationToken,
    ) -> DatasourceResult<()> {
        let attempts = self.retry.max_attempts();
        let mut backoff = self.retry.initial_backoff;
        let mut last_error: Option<DatasourceError> = None;

        for attempt in 1..=attempts {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return self.cancelled(identity).await,
                result = self.connect(identity) => result,
            };

            let err = match result {
                Ok(()) => {
                    if attempt > 1 {
                        info!(datasource = %identity, attempt, "Datasource connected after retry");
                    }
                    return Ok(());
                },
                Err(err) if err.is_identity_error() => return Err(err),
                Err(err) if err.is_fatal() => {
                    error!(datasource = %identity, attempt, error = %err, "Fatal connection error, not retrying");
                    return Err(err);
                },
                Err(err) => err,
            };

            if attempt < attempts {
                warn!(
                    datasource = %identity,
                    attempt,
                    max_attempts = attempts,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Connection attempt failed, retrying"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return self.cancelled(identity).await,
                    () = tokio::time::sleep(backoff) => {},
                }
                backoff = self.retry.next_backoff(backoff);
            }
            last_error = Some(err);
        }

        let err = DatasourceError::RetriesExhausted {
            identity: identity.to_string(),
            attempts,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        };
        error!(datasource = %identity, "{}", err);
        self.registry.update(identity, |handle| handle.mark_unavailable(&err)).await?;
        Err(err)
    }

    async fn cancelled(&self, identity: &str) -> DatasourceResult<()> {
        let err = DatasourceError::Cancelled(identity.to_string());
        warn!(datasource = %identity, "Connection attempts cancelled");
        self.registry.update(identity, |handle| handle.record_error(&err)).await?;
        Err(err)
    }

    /// Bring every registered datasource up concurrently. Failures are
    /// logged and returned, never propagated.
    pub async fn connect_all(&self, cancel: &CancellationToken) -> Vec<(String, DatasourceResult<()>)> {
        let identities = self.registry.identities().to_sorted_vec();
        let results = join_all(identities.iter().map(|identity| async move {
            (identity.clone(), self.connect_with_retry(identity, cancel).await)
        }))
        .await;

        let connected = results.iter().filter(|(_, r)| r.is_ok()).count();
        if connected == results.len() {
            info!(connected, "All datasources connected");
        } else {
            warn!(
                connected,
                failed = results.len() - connected,
                "Some datasources are unavailable, continuing in degraded mode"
            );
        }
        results
    }
}
