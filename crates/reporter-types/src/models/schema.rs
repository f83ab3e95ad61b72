//! Table schemas discovered from a datasource catalog.

use serde::{Deserialize, Serialize};

/// Schema assumed when a relational datasource does not list any.
pub const DEFAULT_SCHEMA: &str = "public";

/// One column of a discovered table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInformation {
    pub name: String,
    /// Catalog type name (`uuid`, `integer`, `jsonb`, ... or a BSON type name)
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
}

/// A table (or collection) with its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Empty for datasources without schemas (document stores)
    pub schema_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnInformation>,
}

impl TableSchema {
    /// `"schema"."table"`, or just `table` when the schema name is empty.
    pub fn qualified_name(&self) -> String {
        qualify(&self.schema_name, &self.table_name)
    }

    /// Look up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&ColumnInformation> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Resolve a requested field to the column that backs it.
    ///
    /// Dotted paths (`metadata.customer.id`) are accepted when their root
    /// column exists, so nested document values can be reached through a
    /// single selected column.
    pub fn column_for_field(&self, field: &str) -> Option<&ColumnInformation> {
        if let Some(column) = self.column(field) {
            return Some(column);
        }
        let (root, rest) = field.split_once('.')?;
        if rest.is_empty() {
            return None;
        }
        self.column(root)
    }
}

/// Quote an identifier with double quotes, doubling any embedded quote.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn qualify(schema: &str, table: &str) -> String {
    if schema.is_empty() {
        table.to_string()
    } else {
        format!("{}.{}", quote_identifier(schema), quote_identifier(table))
    }
}
