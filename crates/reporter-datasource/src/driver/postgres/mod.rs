//! PostgreSQL implementation of the datasource repository.

mod rows;
mod sql;

use crate::config::connection::relational_url;
use crate::config::{PoolSettings, Timeouts};
use crate::driver::validation::{recognized_filters, validate_query};
use crate::driver::{map_sqlx_err, with_timeout, DriverError, DriverResult, Repository, TableQuery};
use crate::redact::redact_connection_string;
use async_trait::async_trait;
use reporter_types::{
    ColumnInformation, DatasourceConfig, DatasourceKind, FilterCondition, QueryRow, TableSchema,
    DEFAULT_SCHEMA,
};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::{Connection, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use self::rows::decode_row;
use self::sql::{build_advanced_query, build_in_query, Statement};

const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

const SCHEMA_QUERY: &str = r"
SELECT c.table_schema::text AS table_schema,
       c.table_name::text AS table_name,
       c.column_name::text AS column_name,
       c.data_type::text AS data_type,
       (c.is_nullable = 'YES') AS is_nullable,
       EXISTS (
           SELECT 1
           FROM information_schema.table_constraints tc
           JOIN information_schema.key_column_usage kcu
             ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
            AND tc.table_name = kcu.table_name
           WHERE tc.constraint_type = 'PRIMARY KEY'
             AND tc.table_schema = c.table_schema
             AND tc.table_name = c.table_name
             AND kcu.column_name = c.column_name
       ) AS is_primary_key
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema
 AND t.table_name = c.table_name
WHERE c.table_schema::text = ANY($1)
  AND t.table_type IN ('BASE TABLE', 'VIEW')
ORDER BY c.table_schema, c.table_name, c.ordinal_position";

const LIST_SCHEMAS_QUERY: &str = r"
SELECT schema_name::text AS schema_name
FROM information_schema.schemata
WHERE schema_name NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
  AND schema_name NOT LIKE 'pg\_temp\_%'
  AND schema_name NOT LIKE 'pg\_toast\_temp\_%'
ORDER BY schema_name";

/// PostgreSQL-backed datasource repository.
pub struct PostgresRepository {
    identity: String,
    /// Database connection pool.
    pool: PgPool,
    timeouts: Timeouts,
    closed: AtomicBool,
}

impl PostgresRepository {
    /// Dial the server once, then open the pool.
    ///
    /// The first handshake uses a dedicated connection so that refused,
    /// unresolvable and unauthorized targets surface their own error rather
    /// than the pool's acquire timeout.
    pub async fn connect(
        config: &DatasourceConfig,
        timeouts: Timeouts,
        pool: PoolSettings,
    ) -> DriverResult<Self> {
        let url = relational_url(config)?;
        let redacted = redact_connection_string(&url);
        let options = PgConnectOptions::from_str(&url)
            .map_err(|e| DriverError::InvalidConfig(format!("{}: {}", redacted, e)))?;

        debug!(datasource = %config.identity, url = %redacted, "Dialing PostgreSQL");

        let handshake = with_timeout("connect", timeouts.connect, async {
            let conn = PgConnection::connect_with(&options).await.map_err(map_sqlx_err)?;
            conn.close().await.map_err(map_sqlx_err)
        })
        .await;
        if let Err(err) = handshake {
            return Err(match err {
                DriverError::Execution(msg) => DriverError::Connection(msg),
                other => other,
            });
        }

        let pool = PgPoolOptions::new()
            .max_connections(pool.max_open)
            .min_connections(pool.max_idle)
            .acquire_timeout(timeouts.connect)
            .idle_timeout(IDLE_TIMEOUT)
            .connect_lazy_with(options);

        info!(datasource = %config.identity, url = %redacted, "PostgreSQL datasource connected");
        Ok(Self { identity: config.identity.clone(), pool, timeouts, closed: AtomicBool::new(false) })
    }

    /// Get reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::Shutdown);
        }
        Ok(())
    }

    async fn run(&self, statement: Statement, after: Duration) -> DriverResult<Vec<QueryRow>> {
        debug!(datasource = %self.identity, sql = %statement.sql, params = statement.params.len(), "Executing query");

        with_timeout("query", after, async {
            let mut query = sqlx::query(&statement.sql);
            for param in &statement.params {
                query = query.bind(param.as_deref());
            }
            let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_err)?;
            rows.iter().map(|row| decode_row(row, &statement.columns)).collect()
        })
        .await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    fn kind(&self) -> DatasourceKind {
        DatasourceKind::Relational
    }

    async fn get_schema(&self, schemas: &[String]) -> DriverResult<Vec<TableSchema>> {
        self.ensure_open()?;
        let schemas: Vec<String> = if schemas.is_empty() {
            vec![DEFAULT_SCHEMA.to_string()]
        } else {
            schemas.to_vec()
        };

        let rows = with_timeout("schema discovery", self.timeouts.schema_discovery, async {
            sqlx::query(SCHEMA_QUERY)
                .bind(&schemas)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)
        })
        .await?;

        let mut tables: Vec<TableSchema> = Vec::new();
        for row in &rows {
            let schema_name: String = row.try_get("table_schema").map_err(map_sqlx_err)?;
            let table_name: String = row.try_get("table_name").map_err(map_sqlx_err)?;
            let column = ColumnInformation {
                name: row.try_get("column_name").map_err(map_sqlx_err)?,
                data_type: row.try_get("data_type").map_err(map_sqlx_err)?,
                is_nullable: row.try_get("is_nullable").map_err(map_sqlx_err)?,
                is_primary_key: row.try_get("is_primary_key").map_err(map_sqlx_err)?,
            };

            match tables.last_mut() {
                Some(t) if t.schema_name == schema_name && t.table_name == table_name => {
                    t.columns.push(column);
                },
                _ => tables.push(TableSchema { schema_name, table_name, columns: vec![column] }),
            }
        }

        debug!(datasource = %self.identity, tables = tables.len(), "Schema discovered");
        Ok(tables)
    }

    async fn list_schemas(&self) -> DriverResult<Vec<String>> {
        self.ensure_open()?;
        let rows = with_timeout("schema listing", self.timeouts.fast_query, async {
            sqlx::query(LIST_SCHEMAS_QUERY).fetch_all(&self.pool).await.map_err(map_sqlx_err)
        })
        .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("schema_name").map_err(map_sqlx_err))
            .collect()
    }

    async fn query(
        &self,
        query: TableQuery<'_>,
        filter: &HashMap<String, Vec<Value>>,
    ) -> DriverResult<Vec<QueryRow>> {
        self.ensure_open()?;
        let table = validate_query(&query)?;
        let statement = build_in_query(table, query.fields, &recognized_filters(table, filter))?;
        self.run(statement, self.timeouts.medium_query).await
    }

    async fn query_with_advanced_filters(
        &self,
        query: TableQuery<'_>,
        filter: &HashMap<String, FilterCondition>,
    ) -> DriverResult<Vec<QueryRow>> {
        self.ensure_open()?;
        let table = validate_query(&query)?;
        let statement =
            build_advanced_query(table, query.fields, &recognized_filters(table, filter))?;
        self.run(statement, self.timeouts.slow_query).await
    }

    async fn close(&self) -> DriverResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.pool.close().await;
        info!(datasource = %self.identity, "PostgreSQL pool closed");
        Ok(())
    }
}
