//! Query entry point used by report generation.
//!
//! Every call checks the identity against the registry, requires a live
//! driver, resolves the target schema from the cached snapshot and runs the
//! driver call through the identity's circuit breaker. Validation failures
//! are returned to the caller without counting against the breaker.

use crate::circuit_breaker::CircuitBreakerManager;
use crate::config::Timeouts;
use crate::driver::validation::validate_query;
use crate::driver::{DriverError, DriverResult, Repository, TableQuery};
use crate::error::{DatasourceError, DatasourceResult};
use crate::registry::{DatasourceHandle, DatasourceRegistry};
use crate::resolver::resolve_schema;
use reporter_types::{DatasourceKind, FilterCondition, QueryRow, TableSchema, DEFAULT_SCHEMA};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry-aware, breaker-protected access to datasource drivers.
#[derive(Debug, Clone)]
pub struct QueryService {
    registry: Arc<DatasourceRegistry>,
    breakers: Arc<CircuitBreakerManager>,
    timeouts: Timeouts,
}

impl QueryService {
    pub fn new(
        registry: Arc<DatasourceRegistry>,
        breakers: Arc<CircuitBreakerManager>,
        timeouts: Timeouts,
    ) -> Self {
        Self { registry, breakers, timeouts }
    }

    /// Handle of a registered identity with a live driver.
    async fn connected(&self, identity: &str) -> DatasourceResult<(DatasourceHandle, Arc<dyn Repository>)> {
        if !self.registry.is_registered(identity) {
            return Err(DatasourceError::UnregisteredIdentity(identity.to_string()));
        }
        let handle = self
            .registry
            .get(identity)
            .await
            .ok_or_else(|| DatasourceError::MissingHandle(identity.to_string()))?;

        match handle.driver().cloned() {
            Some(driver) if handle.is_initialized() => Ok((handle, driver)),
            _ => Err(DatasourceError::Unavailable(identity.to_string())),
        }
    }

    /// Run `f` through the breaker. Validation errors pass through as
    /// breaker successes.
    async fn guarded<T, F, Fut>(&self, identity: &str, f: F) -> DatasourceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        let outcome = self
            .breakers
            .execute(identity, || async move {
                match f().await {
                    Ok(value) => Ok(Ok(value)),
                    Err(err) if err.is_validation() => Ok(Err(err)),
                    Err(err) => Err(DatasourceError::from(err)),
                }
            })
            .await?;
        outcome.map_err(DatasourceError::from)
    }

    /// Tables of `identity`, discovered once and cached on the handle until
    /// the next reconnection.
    pub async fn get_database_schema(&self, identity: &str) -> DatasourceResult<Arc<Vec<TableSchema>>> {
        let (handle, driver) = self.connected(identity).await?;
        self.snapshot(identity, &handle, driver).await
    }

    async fn snapshot(
        &self,
        identity: &str,
        handle: &DatasourceHandle,
        driver: Arc<dyn Repository>,
    ) -> DatasourceResult<Arc<Vec<TableSchema>>> {
        if let Some(cached) = handle.table_schemas() {
            if self.breakers.is_healthy(identity) {
                return Ok(Arc::clone(cached));
            }
        }

        let schemas = match handle.kind() {
            DatasourceKind::Relational if handle.schemas().is_empty() => vec![DEFAULT_SCHEMA.to_string()],
            DatasourceKind::Relational => handle.schemas().to_vec(),
            _ => Vec::new(),
        };
        let timeout = self.timeouts.schema_discovery;

        let tables = self
            .guarded(identity, || async move {
                tokio::time::timeout(timeout, driver.get_schema(&schemas))
                    .await
                    .map_err(|_| DriverError::Timeout { operation: "schema discovery", after: timeout })?
            })
            .await?;

        let tables = Arc::new(tables);
        self.registry.cache_table_schemas(identity, Arc::clone(&tables)).await?;
        info!(datasource = %identity, tables = tables.len(), "Schema snapshot cached");
        Ok(tables)
    }

    /// Catalog schemas of a relational datasource.
    pub async fn list_schemas(&self, identity: &str) -> DatasourceResult<Vec<String>> {
        let (_, driver) = self.connected(identity).await?;
        self.guarded(identity, || async move { driver.list_schemas().await }).await
    }

    /// Resolve the schema and validate the request before any IO.
    async fn prepare(
        &self,
        identity: &str,
        schema: Option<&str>,
        table: &str,
        fields: &[String],
    ) -> DatasourceResult<(Arc<dyn Repository>, Arc<Vec<TableSchema>>, Option<String>)> {
        let (handle, driver) = self.connected(identity).await?;
        let snapshot = self.snapshot(identity, &handle, Arc::clone(&driver)).await?;

        let schema_name = match handle.kind() {
            DatasourceKind::Relational => Some(resolve_schema(identity, &snapshot, schema, table)?),
            _ => None,
        };

        validate_query(&TableQuery {
            snapshot: &snapshot,
            schema_name: schema_name.as_deref(),
            table,
            fields,
        })?;

        debug!(datasource = %identity, table = %table, schema = ?schema_name, "Query prepared");
        Ok((driver, snapshot, schema_name))
    }

    /// Select `fields` from `table` where each filter field is IN its values.
    /// Empty `fields` selects every column.
    pub async fn query(
        &self,
        identity: &str,
        schema: Option<&str>,
        table: &str,
        fields: &[String],
        filter: &HashMap<String, Vec<Value>>,
    ) -> DatasourceResult<Vec<QueryRow>> {
        let (driver, snapshot, schema_name) = self.prepare(identity, schema, table, fields).await?;
        let query = TableQuery { snapshot: &snapshot, schema_name: schema_name.as_deref(), table, fields };

        self.guarded(identity, || driver.query(query, filter)).await
    }

    /// Select `fields` from `table` matching every predicate of every filter
    /// condition.
    pub async fn query_with_advanced_filters(
        &self,
        identity: &str,
        schema: Option<&str>,
        table: &str,
        fields: &[String],
        filter: &HashMap<String, FilterCondition>,
    ) -> DatasourceResult<Vec<QueryRow>> {
        let (driver, snapshot, schema_name) = self.prepare(identity, schema, table, fields).await?;
        let query = TableQuery { snapshot: &snapshot, schema_name: schema_name.as_deref(), table, fields };

        self.guarded(identity, || driver.query_with_advanced_filters(query, filter)).await
    }
}
