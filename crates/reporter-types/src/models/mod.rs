//! Core domain models for the reporter datasource registry.

mod datasource;
mod filter;
mod schema;
mod value;

pub use datasource::{DatasourceConfig, DatasourceKind, DatasourceStatus, TlsSettings};
pub use filter::FilterCondition;
pub use schema::{quote_identifier, ColumnInformation, TableSchema, DEFAULT_SCHEMA};
pub use value::{CellValue, QueryRow};
