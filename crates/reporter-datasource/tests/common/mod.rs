//! Shared fakes for integration tests: an in-memory catalog behind the
//! public `Connector` / `Repository` seams.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use async_trait::async_trait;
use parking_lot::Mutex;
use reporter_datasource::{
    CircuitBreakerManager, ConnectionManager, Connector, DatasourceRegistry, DriverError,
    Repository, RetrySettings, TableQuery,
};
use reporter_types::{
    CellValue, ColumnInformation, DatasourceConfig, DatasourceKind, FilterCondition, QueryRow,
    TableSchema,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn table(schema: &str, name: &str, columns: &[&str]) -> TableSchema {
    TableSchema {
        schema_name: schema.to_string(),
        table_name: name.to_string(),
        columns: columns
            .iter()
            .map(|c| ColumnInformation {
                name: (*c).to_string(),
                data_type: if *c == "id" { "uuid" } else { "text" }.to_string(),
                is_nullable: *c != "id",
                is_primary_key: *c == "id",
            })
            .collect(),
    }
}

/// `DATASOURCE_<group>_*` keys for one datasource.
pub fn relational_env(group: &str, identity: &str, kind: &str) -> Vec<(String, String)> {
    [
        ("CONFIG_NAME", identity),
        ("HOST", "db.internal"),
        ("PORT", "5432"),
        ("USER", "reporter"),
        ("PASSWORD", "s3cr3t"),
        ("DATABASE", identity),
        ("TYPE", kind),
        ("SSLMODE", "disable"),
        ("SCHEMAS", "public,payment"),
    ]
    .into_iter()
    .map(|(key, value)| (format!("DATASOURCE_{group}_{key}"), value.to_string()))
    .collect()
}

#[derive(Debug)]
pub struct CatalogRepository {
    kind: DatasourceKind,
    tables: Vec<TableSchema>,
}

#[async_trait]
impl Repository for CatalogRepository {
    fn kind(&self) -> DatasourceKind {
        self.kind.clone()
    }

    async fn get_schema(&self, schemas: &[String]) -> Result<Vec<TableSchema>, DriverError> {
        Ok(self
            .tables
            .iter()
            .filter(|t| schemas.is_empty() || schemas.contains(&t.schema_name))
            .cloned()
            .collect())
    }

    async fn query(
        &self,
        query: TableQuery<'_>,
        _filter: &HashMap<String, Vec<Value>>,
    ) -> Result<Vec<QueryRow>, DriverError> {
        let mut row = QueryRow::new();
        row.insert("table".to_string(), CellValue::from(Value::from(query.table)));
        Ok(vec![row])
    }

    async fn query_with_advanced_filters(
        &self,
        query: TableQuery<'_>,
        _filter: &HashMap<String, FilterCondition>,
    ) -> Result<Vec<QueryRow>, DriverError> {
        self.query(query, &HashMap::new()).await
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Connector that serves a fixed catalog and can be told to refuse.
#[derive(Debug, Default)]
pub struct CatalogConnector {
    tables: Vec<TableSchema>,
    refusing: Mutex<Vec<String>>,
    opens: AtomicUsize,
}

impl CatalogConnector {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables, ..Default::default() }
    }

    pub fn refuse(&self, identity: &str) {
        self.refusing.lock().push(identity.to_string());
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for CatalogConnector {
    async fn open(&self, config: &DatasourceConfig) -> Result<Arc<dyn Repository>, DriverError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.refusing.lock().contains(&config.identity) {
            return Err(DriverError::Connection("connection refused".to_string()));
        }
        Ok(Arc::new(CatalogRepository { kind: config.kind.clone(), tables: self.tables.clone() }))
    }
}

/// Registry, breakers and connection manager wired to `connector`.
pub async fn bring_up(
    configs: Vec<DatasourceConfig>,
    connector: Arc<CatalogConnector>,
) -> (Arc<DatasourceRegistry>, Arc<CircuitBreakerManager>, Arc<ConnectionManager>) {
    let registry = Arc::new(DatasourceRegistry::new());
    registry.initialize(configs).await.expect("fresh registry");

    let retry = RetrySettings {
        max_retries: 3,
        initial_backoff: Duration::from_millis(1),
        multiplier: 2.0,
        max_backoff: Duration::from_millis(5),
    };
    let connections = Arc::new(ConnectionManager::new(
        Arc::clone(&registry),
        connector as Arc<dyn Connector>,
        retry,
        Duration::from_secs(1),
    ));
    (registry, Arc::new(CircuitBreakerManager::new()), connections)
}
