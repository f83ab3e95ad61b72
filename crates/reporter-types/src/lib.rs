//! # Reporter Types
//!
//! Core types, models, and error definitions shared by the reporter
//! datasource registry.
//!
//! - **`error`** - Typed configuration errors
//! - **`models`** - Datasource configs, runtime status, table schemas,
//!   advanced filter conditions and query cell values
//!
//! ## Architecture Role
//!
//! `reporter-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!          reporter-types (this crate)
//!                  │
//!                  ▼
//!          reporter-datasource
//!                  │
//!                  ▼
//!            reporter-probe
//! ```

pub mod error;
pub mod models;

pub use error::ConfigError;

pub use models::{
    quote_identifier, CellValue, ColumnInformation, DatasourceConfig, DatasourceKind,
    DatasourceStatus, FilterCondition, QueryRow, TableSchema, TlsSettings, DEFAULT_SCHEMA,
};
