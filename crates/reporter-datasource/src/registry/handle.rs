//! Per-identity runtime record.

use crate::driver::Repository;
use chrono::{DateTime, Utc};
use reporter_types::{DatasourceConfig, DatasourceKind, DatasourceStatus, TableSchema};
use std::sync::Arc;

/// Mutable runtime state of one datasource.
///
/// `identity` and `kind` are fixed at creation. `status` is only
/// `Available` while a driver is attached and initialized.
#[derive(Debug, Clone)]
pub struct DatasourceHandle {
    identity: String,
    kind: DatasourceKind,
    driver: Option<Arc<dyn Repository>>,
    config: DatasourceConfig,
    initialized: bool,
    status: DatasourceStatus,
    last_error: Option<String>,
    last_attempt: Option<DateTime<Utc>>,
    retry_count: u32,
    schemas: Vec<String>,
    tenant_id: Option<String>,
    /// Last discovered schema snapshot, dropped on reconnection
    table_schemas: Option<Arc<Vec<TableSchema>>>,
}

impl DatasourceHandle {
    pub fn from_config(config: DatasourceConfig) -> Self {
        let schemas = match config.kind {
            DatasourceKind::Relational => config.effective_schemas(),
            _ => Vec::new(),
        };
        Self {
            identity: config.identity.clone(),
            kind: config.kind.clone(),
            driver: None,
            tenant_id: config.tenant_id.clone(),
            config,
            initialized: false,
            status: DatasourceStatus::Unknown,
            last_error: None,
            last_attempt: None,
            retry_count: 0,
            schemas,
            table_schemas: None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn kind(&self) -> &DatasourceKind {
        &self.kind
    }

    pub fn driver(&self) -> Option<&Arc<dyn Repository>> {
        self.driver.as_ref()
    }

    pub fn config(&self) -> &DatasourceConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn status(&self) -> DatasourceStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_attempt
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn schemas(&self) -> &[String] {
        &self.schemas
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn table_schemas(&self) -> Option<&Arc<Vec<TableSchema>>> {
        self.table_schemas.as_ref()
    }

    /// Record a failed bring-up or probe. The driver, if any, is kept so a
    /// later probe can still reach it.
    pub fn mark_unavailable(&mut self, error: impl ToString) {
        self.status = DatasourceStatus::Unavailable;
        self.initialized = false;
        self.last_error = Some(error.to_string());
    }

    /// Attach a freshly opened driver, returning the one it replaces.
    pub(crate) fn mark_connected(&mut self, driver: Arc<dyn Repository>) -> Option<Arc<dyn Repository>> {
        self.status = DatasourceStatus::Available;
        self.initialized = true;
        self.last_error = None;
        self.table_schemas = None;
        self.driver.replace(driver)
    }

    /// Probe result for an initialized handle.
    pub(crate) fn mark_probed(&mut self, healthy: bool, error: Option<String>) {
        if !self.initialized {
            return;
        }
        if healthy {
            self.status = DatasourceStatus::Available;
            self.last_error = None;
        } else {
            self.status = DatasourceStatus::Degraded;
            self.last_error = error;
        }
    }

    /// Stamp a connection attempt.
    pub(crate) fn begin_attempt(&mut self) {
        self.last_attempt = Some(Utc::now());
        self.retry_count = self.retry_count.saturating_add(1);
    }

    pub(crate) fn reset_attempts(&mut self) {
        self.retry_count = 0;
        self.last_attempt = Some(Utc::now());
    }

    pub(crate) fn record_error(&mut self, error: impl ToString) {
        self.last_error = Some(error.to_string());
    }

    pub(crate) fn set_table_schemas(&mut self, tables: Arc<Vec<TableSchema>>) {
        self.table_schemas = Some(tables);
    }

    /// Detach the driver for shutdown.
    pub(crate) fn take_driver(&mut self) -> Option<Arc<dyn Repository>> {
        self.initialized = false;
        self.status = DatasourceStatus::Unknown;
        self.table_schemas = None;
        self.driver.take()
    }
}
