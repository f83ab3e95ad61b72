//! Thread-safe registry of datasource handles.
//!
//! Membership is fixed at startup by [`RegisteredIdentities`]; handle
//! contents change over the process lifetime. Every lookup that could
//! mutate checks the allow-list first and the runtime map second, and a
//! rejected call never touches the map.

mod handle;
mod identities;


pub use handle::DatasourceHandle;
pub use identities::RegisteredIdentities;

use crate::driver::Connector;
use crate::error::{DatasourceError, DatasourceResult};
use crate::task;
use futures::future::join_all;
use reporter_types::{DatasourceConfig, DatasourceKind, TableSchema};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Owner of every [`DatasourceHandle`]. Callers only receive copies.
#[derive(Debug, Default)]
pub struct DatasourceRegistry {
    identities: RegisteredIdentities,
    handles: RwLock<HashMap<String, DatasourceHandle>>,
}

impl DatasourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the identity set from `configs` and create one handle per config
    /// in `unknown` state. Can only succeed once.
    pub async fn initialize(&self, configs: Vec<DatasourceConfig>) -> DatasourceResult<()> {
        self.identities.initialize(configs.iter().map(|c| c.identity.clone()))?;

        let mut handles = self.handles.write().await;
        for config in configs {
            let identity = config.identity.clone();
            handles.insert(identity, DatasourceHandle::from_config(config));
        }
        info!(count = handles.len(), "Datasource registry initialized");
        Ok(())
    }

    pub fn identities(&self) -> &RegisteredIdentities {
        &self.identities
    }

    pub fn is_registered(&self, identity: &str) -> bool {
        self.identities.contains(identity)
    }

    fn check_registered(&self, identity: &str) -> DatasourceResult<()> {
        if self.identities.contains(identity) {
            Ok(())
        } else {
            Err(DatasourceError::UnregisteredIdentity(identity.to_string()))
        }
    }

    /// Copy of the handle for `identity`.
    pub async fn get(&self, identity: &str) -> Option<DatasourceHandle> {
        self.handles.read().await.get(identity).cloned()
    }

    /// Store `handle` under `identity`. The identity must be registered and
    /// match the handle's own identity.
    pub async fn set(&self, identity: &str, handle: DatasourceHandle) -> DatasourceResult<()> {
        self.check_registered(identity)?;
        if handle.identity() != identity {
            return Err(DatasourceError::IdentityMismatch {
                key: identity.to_string(),
                handle: handle.identity().to_string(),
            });
        }
        self.handles.write().await.insert(identity.to_string(), handle);
        Ok(())
    }

    /// Shallow copy of the whole map; mutating it does not reach the registry.
    pub async fn get_all(&self) -> HashMap<String, DatasourceHandle> {
        self.handles.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }

    /// Mutate the handle of a registered, present identity under the write
    /// lock.
    pub async fn update<F, R>(&self, identity: &str, f: F) -> DatasourceResult<R>
    where
        F: FnOnce(&mut DatasourceHandle) -> R,
    {
        self.check_registered(identity)?;
        let mut handles = self.handles.write().await;
        let handle = handles
            .get_mut(identity)
            .ok_or_else(|| DatasourceError::MissingHandle(identity.to_string()))?;
        Ok(f(handle))
    }

    /// Open a driver for `identity` and publish the result, all under the
    /// write lock so `initialized = true` becomes visible atomically with the
    /// new driver. `timeout` bounds the time the lock is held.
    pub async fn connect_datasource(
        &self,
        identity: &str,
        connector: &dyn Connector,
        timeout: Duration,
    ) -> DatasourceResult<()> {
        self.check_registered(identity)?;

        let mut handles = self.handles.write().await;
        let handle = handles
            .get_mut(identity)
            .ok_or_else(|| DatasourceError::MissingHandle(identity.to_string()))?;

        if let DatasourceKind::Unsupported(kind) = handle.kind() {
            let err = DatasourceError::UnsupportedKind(kind.clone());
            error!(datasource = %identity, "{}", err);
            handle.begin_attempt();
            handle.mark_unavailable(&err);
            return Err(err);
        }

        debug!(
            datasource = %identity,
            kind = %handle.kind(),
            attempt = handle.retry_count().saturating_add(1),
            "Connecting datasource"
        );

        let opened = match tokio::time::timeout(timeout, connector.open(handle.config())).await {
            Ok(result) => result.map_err(DatasourceError::from),
            Err(_) => Err(DatasourceError::Driver(crate::driver::DriverError::Timeout {
                operation: "connect",
                after: timeout,
            })),
        };

        // Stamped only once the open settles; a dropped call leaves no trace.
        handle.begin_attempt();

        match opened {
            Ok(driver) => {
                if let Some(previous) = handle.mark_connected(driver) {
                    task::spawn_and_forget("close-replaced-driver", async move {
                        if let Err(err) = previous.close().await {
                            warn!(error = %err, "Failed to close replaced driver");
                        }
                    });
                }
                info!(datasource = %identity, kind = %handle.kind(), "✓ Datasource connected");
                Ok(())
            },
            Err(err) => {
                warn!(datasource = %identity, error = %err, "Datasource connection failed");
                handle.mark_unavailable(&err);
                Err(err)
            },
        }
    }

    /// Cache a discovered schema snapshot on the handle.
    pub async fn cache_table_schemas(
        &self,
        identity: &str,
        tables: Arc<Vec<TableSchema>>,
    ) -> DatasourceResult<()> {
        self.update(identity, |handle| handle.set_table_schemas(tables)).await
    }

    /// Close every driver and mark all handles uninitialized.
    pub async fn close_all(&self) {
        let drivers: Vec<_> = {
            let mut handles = self.handles.write().await;
            handles
                .values_mut()
                .filter_map(|h| h.take_driver().map(|d| (h.identity().to_string(), d)))
                .collect()
        };

        let results = join_all(drivers.into_iter().map(|(identity, driver)| async move {
            (identity, driver.close().await)
        }))
        .await;

        for (identity, result) in results {
            match result {
                Ok(()) => debug!(datasource = %identity, "Driver closed"),
                Err(err) => warn!(datasource = %identity, error = %err, "Driver close failed"),
            }
        }
        info!("All datasource drivers closed");
    }
}
