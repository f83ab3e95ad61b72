//! MongoDB implementation of the datasource repository.
//!
//! Collections have no schema: `get_schema` lists collections and infers a
//! shallow column set from one sample document each. With a tenant id set,
//! logical collection `X` lives physically in `X_<tenant>`.

mod filter;

use crate::config::connection::document_uri;
use crate::config::{PoolSettings, Timeouts};
use crate::driver::validation::{recognized_filters, validate_query};
use crate::driver::{map_mongo_err, with_timeout, DriverError, DriverResult, Repository, TableQuery};
use crate::redact::redact_connection_string;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use reporter_types::{
    ColumnInformation, DatasourceConfig, DatasourceKind, FilterCondition, QueryRow, TableSchema,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use self::filter::{advanced_filter, bson_type_name, document_to_row, in_filter, projection};

const APP_NAME: &str = "reporter-datasource";

/// MongoDB-backed datasource repository.
pub struct MongoRepository {
    identity: String,
    client: Client,
    database: Database,
    tenant_id: Option<String>,
    timeouts: Timeouts,
    closed: AtomicBool,
}

impl MongoRepository {
    /// Build the client and ping the database before returning.
    pub async fn connect(
        config: &DatasourceConfig,
        timeouts: Timeouts,
        pool: PoolSettings,
    ) -> DriverResult<Self> {
        let uri = document_uri(config)?;
        let redacted = redact_connection_string(&uri);

        let mut options = with_timeout("connect", timeouts.connect, async {
            ClientOptions::parse(&uri)
                .await
                .map_err(|e| DriverError::InvalidConfig(format!("{}: {}", redacted, e)))
        })
        .await?;
        options.app_name = Some(APP_NAME.to_string());
        options.max_pool_size = Some(pool.max_open);
        options.min_pool_size = Some(pool.max_idle);
        options.connect_timeout = Some(timeouts.connect);
        options.server_selection_timeout = Some(timeouts.connect);

        debug!(datasource = %config.identity, uri = %redacted, "Opening MongoDB client");

        let client = Client::with_options(options).map_err(map_mongo_err)?;
        let database = client.database(&config.database);

        let ping = with_timeout("connect", timeouts.connect, async {
            database.run_command(doc! { "ping": 1 }).await.map(|_| ()).map_err(map_mongo_err)
        })
        .await;
        if let Err(err) = ping {
            client.shutdown().await;
            return Err(match err {
                DriverError::Execution(msg) => DriverError::Connection(msg),
                other => other,
            });
        }

        info!(datasource = %config.identity, uri = %redacted, "MongoDB datasource connected");
        Ok(Self {
            identity: config.identity.clone(),
            client,
            database,
            tenant_id: config.tenant_id.clone(),
            timeouts,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::Shutdown);
        }
        Ok(())
    }

    async fn sample_columns(&self, physical: &str) -> DriverResult<Vec<ColumnInformation>> {
        let sample = self
            .database
            .collection::<Document>(physical)
            .find_one(doc! {})
            .max_time(self.timeouts.fast_query)
            .await
            .map_err(map_mongo_err)?;

        Ok(sample
            .map(|document| {
                document
                    .iter()
                    .map(|(key, value)| ColumnInformation {
                        name: key.clone(),
                        data_type: bson_type_name(value).to_string(),
                        is_nullable: true,
                        is_primary_key: key == "_id",
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find(
        &self,
        table: &str,
        filter: Document,
        fields: &[String],
        after: Duration,
    ) -> DriverResult<Vec<QueryRow>> {
        let physical = physical_name(table, self.tenant_id.as_deref());
        let collection = self.database.collection::<Document>(&physical);
        debug!(datasource = %self.identity, collection = %physical, filter = %filter, "Executing find");

        with_timeout("query", after, async {
            let mut find = collection.find(filter).max_time(after);
            if let Some(projection) = projection(fields) {
                find = find.projection(projection);
            }
            let cursor = find.await.map_err(map_mongo_err)?;
            let documents: Vec<Document> = cursor.try_collect().await.map_err(map_mongo_err)?;
            Ok(documents.into_iter().map(document_to_row).collect())
        })
        .await
    }
}

/// Physical collection for a logical name.
pub(crate) fn physical_name(logical: &str, tenant_id: Option<&str>) -> String {
    match tenant_id {
        Some(tenant) => format!("{}_{}", logical, tenant),
        None => logical.to_string(),
    }
}

/// Logical name of a physical collection, or `None` when it belongs to
/// another tenant or is a system collection.
pub(crate) fn logical_name<'a>(physical: &'a str, tenant_id: Option<&str>) -> Option<&'a str> {
    if physical.starts_with("system.") {
        return None;
    }
    match tenant_id {
        Some(tenant) => physical
            .strip_suffix(tenant)
            .and_then(|rest| rest.strip_suffix('_'))
            .filter(|logical| !logical.is_empty()),
        None => Some(physical),
    }
}

#[async_trait]
impl Repository for MongoRepository {
    fn kind(&self) -> DatasourceKind {
        DatasourceKind::Document
    }

    async fn get_schema(&self, _schemas: &[String]) -> DriverResult<Vec<TableSchema>> {
        self.ensure_open()?;

        with_timeout("schema discovery", self.timeouts.schema_discovery, async {
            let mut names = self.database.list_collection_names().await.map_err(map_mongo_err)?;
            names.sort();

            let mut tables = Vec::new();
            for physical in &names {
                let Some(logical) = logical_name(physical, self.tenant_id.as_deref()) else {
                    continue;
                };
                tables.push(TableSchema {
                    schema_name: String::new(),
                    table_name: logical.to_string(),
                    columns: self.sample_columns(physical).await?,
                });
            }
            debug!(datasource = %self.identity, collections = tables.len(), "Schema discovered");
            Ok(tables)
        })
        .await
    }

    async fn query(
        &self,
        query: TableQuery<'_>,
        filter: &HashMap<String, Vec<Value>>,
    ) -> DriverResult<Vec<QueryRow>> {
        self.ensure_open()?;
        let table = validate_query(&query)?;
        let filter = in_filter(&recognized_filters(table, filter))?;
        self.find(query.table, filter, query.fields, self.timeouts.medium_query).await
    }

    async fn query_with_advanced_filters(
        &self,
        query: TableQuery<'_>,
        filter: &HashMap<String, FilterCondition>,
    ) -> DriverResult<Vec<QueryRow>> {
        self.ensure_open()?;
        let table = validate_query(&query)?;
        let filter = advanced_filter(&recognized_filters(table, filter))?;
        self.find(query.table, filter, query.fields, self.timeouts.slow_query).await
    }

    async fn close(&self) -> DriverResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.client.clone().shutdown().await;
        info!(datasource = %self.identity, "MongoDB client closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_name() {
        assert_eq!(physical_name("holders", Some("org1")), "holders_org1");
        assert_eq!(physical_name("holders", None), "holders");
    }

    #[test]
    fn test_logical_name_filters_other_tenants() {
        assert_eq!(logical_name("holders_org1", Some("org1")), Some("holders"));
        assert_eq!(logical_name("holders_org2", Some("org1")), None);
        assert_eq!(logical_name("_org1", Some("org1")), None);
        assert_eq!(logical_name("holdersorg1", Some("org1")), None);
        assert_eq!(logical_name("system.views", None), None);
        assert_eq!(logical_name("holders", None), Some("holders"));
    }
}
