//! In-memory driver fakes for unit tests.

use crate::driver::validation::validate_query;
use crate::driver::{Connector, DriverError, DriverResult, Repository, TableQuery};
use async_trait::async_trait;
use parking_lot::Mutex;
use reporter_types::{
    CellValue, ColumnInformation, DatasourceConfig, DatasourceKind, FilterCondition, QueryRow,
    TableSchema, TlsSettings,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn config(identity: &str, kind: DatasourceKind) -> DatasourceConfig {
    DatasourceConfig {
        identity: identity.to_string(),
        kind,
        host: "localhost".to_string(),
        port: 5432,
        user: "reporter".to_string(),
        password: "secret".to_string(),
        database: identity.to_string(),
        tls: TlsSettings::default(),
        options: None,
        schemas: vec!["public".to_string()],
        tenant_id: None,
    }
}

pub(crate) fn table(schema: &str, name: &str, columns: &[&str]) -> TableSchema {
    TableSchema {
        schema_name: schema.to_string(),
        table_name: name.to_string(),
        columns: columns
            .iter()
            .map(|c| ColumnInformation {
                name: (*c).to_string(),
                data_type: "text".to_string(),
                is_nullable: true,
                is_primary_key: *c == "id",
            })
            .collect(),
    }
}

#[derive(Debug)]
pub(crate) struct FakeRepository {
    kind: DatasourceKind,
    tables: Vec<TableSchema>,
    pub healthy: AtomicBool,
    pub fail_queries: AtomicBool,
    pub schema_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub closed: AtomicBool,
}

impl FakeRepository {
    pub(crate) fn new(kind: DatasourceKind, tables: Vec<TableSchema>) -> Self {
        Self {
            kind,
            tables,
            healthy: AtomicBool::new(true),
            fail_queries: AtomicBool::new(false),
            schema_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn rows(&self, query: &TableQuery<'_>) -> DriverResult<Vec<QueryRow>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(DriverError::Execution("connection reset by peer".to_string()));
        }
        let table = validate_query(query)?;
        let mut row = QueryRow::new();
        row.insert("table".to_string(), CellValue::from(Value::from(table.qualified_name())));
        Ok(vec![row])
    }
}

#[async_trait]
impl Repository for FakeRepository {
    fn kind(&self) -> DatasourceKind {
        self.kind.clone()
    }

    async fn get_schema(&self, schemas: &[String]) -> DriverResult<Vec<TableSchema>> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Shutdown);
        }
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(DriverError::Execution("connection reset by peer".to_string()));
        }
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
    ) -> DriverResult<Vec<QueryRow>> {
        self.rows(&query)
    }

    async fn query_with_advanced_filters(
        &self,
        query: TableQuery<'_>,
        _filter: &HashMap<String, FilterCondition>,
    ) -> DriverResult<Vec<QueryRow>> {
        self.rows(&query)
    }

    async fn close(&self) -> DriverResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector with scripted failures per identity.
#[derive(Debug, Default)]
pub(crate) struct FakeConnector {
    tables: Vec<TableSchema>,
    /// identity -> (remaining failures, message)
    failures: Mutex<HashMap<String, (usize, String)>>,
    opens: Mutex<HashMap<String, usize>>,
    opened: Mutex<HashMap<String, Arc<FakeRepository>>>,
    stalls: Mutex<HashMap<String, Duration>>,
}

impl FakeConnector {
    pub(crate) fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables, ..Default::default() }
    }

    pub(crate) fn fail(&self, identity: &str, times: usize, message: &str) {
        self.failures.lock().insert(identity.to_string(), (times, message.to_string()));
    }

    /// Hold every open for `identity` for `delay` before it settles.
    pub(crate) fn stall(&self, identity: &str, delay: Duration) {
        self.stalls.lock().insert(identity.to_string(), delay);
    }

    pub(crate) fn opens(&self, identity: &str) -> usize {
        self.opens.lock().get(identity).copied().unwrap_or(0)
    }

    pub(crate) fn repository(&self, identity: &str) -> Option<Arc<FakeRepository>> {
        self.opened.lock().get(identity).cloned()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, config: &DatasourceConfig) -> DriverResult<Arc<dyn Repository>> {
        *self.opens.lock().entry(config.identity.clone()).or_insert(0) += 1;

        let stall = self.stalls.lock().get(&config.identity).copied();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        if let Some((remaining, message)) = self.failures.lock().get_mut(&config.identity) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::Connection(message.clone()));
            }
        }

        let repo = Arc::new(FakeRepository::new(config.kind.clone(), self.tables.clone()));
        self.opened.lock().insert(config.identity.clone(), Arc::clone(&repo));
        Ok(repo)
    }
}
