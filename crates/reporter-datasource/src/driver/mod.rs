//! Schema-qualified drivers.
//!
//! A [`Repository`] is one open datasource; a [`Connector`] opens them from
//! configuration. [`NativeConnector`] dispatches to the PostgreSQL and
//! MongoDB implementations; tests plug in their own connector.

mod error;
pub mod mongo;
pub mod postgres;
pub(crate) mod validation;

pub use error::{DriverError, DriverResult};
pub(crate) use error::{map_mongo_err, map_sqlx_err};

use crate::config::{PoolSettings, Timeouts};
use async_trait::async_trait;
use reporter_types::{DatasourceConfig, DatasourceKind, FilterCondition, QueryRow, TableSchema};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Target of a query: the table, the schema it lives in and the fields to
/// return, validated against a previously discovered schema snapshot.
#[derive(Debug, Clone, Copy)]
pub struct TableQuery<'a> {
    pub snapshot: &'a [TableSchema],
    /// `None` matches the first table with that name in the snapshot
    pub schema_name: Option<&'a str>,
    pub table: &'a str,
    /// Empty selects every column of the table
    pub fields: &'a [String],
}

/// One open datasource.
#[async_trait]
pub trait Repository: Send + Sync {
    fn kind(&self) -> DatasourceKind;

    /// Introspect tables, columns and primary keys. Document stores ignore
    /// `schemas`.
    async fn get_schema(&self, schemas: &[String]) -> DriverResult<Vec<TableSchema>>;

    /// Non-system schemas visible to the connection.
    async fn list_schemas(&self) -> DriverResult<Vec<String>> {
        Ok(Vec::new())
    }

    /// `field IN (values)` per recognized filter field.
    async fn query(
        &self,
        query: TableQuery<'_>,
        filter: &HashMap<String, Vec<Value>>,
    ) -> DriverResult<Vec<QueryRow>>;

    async fn query_with_advanced_filters(
        &self,
        query: TableQuery<'_>,
        filter: &HashMap<String, FilterCondition>,
    ) -> DriverResult<Vec<QueryRow>>;

    /// Idempotent.
    async fn close(&self) -> DriverResult<()>;
}

impl fmt::Debug for dyn Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Repository({})", self.kind())
    }
}

/// Opens a [`Repository`] for a config.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, config: &DatasourceConfig) -> DriverResult<Arc<dyn Repository>>;
}

/// Connector backed by the real drivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConnector {
    timeouts: Timeouts,
    pool: PoolSettings,
}

impl NativeConnector {
    pub fn new(timeouts: Timeouts, pool: PoolSettings) -> Self {
        Self { timeouts, pool }
    }
}

#[async_trait]
impl Connector for NativeConnector {
    async fn open(&self, config: &DatasourceConfig) -> DriverResult<Arc<dyn Repository>> {
        match &config.kind {
            DatasourceKind::Relational => {
                let repo = postgres::PostgresRepository::connect(config, self.timeouts, self.pool)
                    .await?;
                Ok(Arc::new(repo))
            },
            DatasourceKind::Document => {
                let repo =
                    mongo::MongoRepository::connect(config, self.timeouts, self.pool).await?;
                Ok(Arc::new(repo))
            },
            DatasourceKind::Unsupported(kind) => Err(DriverError::UnsupportedKind(kind.clone())),
        }
    }
}

/// Run `fut` under `after`, mapping elapsed deadlines to
/// [`DriverError::Timeout`].
pub(crate) async fn with_timeout<F, T>(
    operation: &'static str,
    after: std::time::Duration,
    fut: F,
) -> DriverResult<T>
where
    F: std::future::Future<Output = DriverResult<T>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| DriverError::Timeout { operation, after })?
}
