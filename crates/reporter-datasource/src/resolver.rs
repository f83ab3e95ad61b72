//! Schema resolution for table references.
//!
//! A table name may exist in several schemas of one datasource. Resolution
//! picks the only candidate, prefers `public` among several, and otherwise
//! reports an [`AmbiguityError`] listing the explicit forms the caller can
//! use instead.

use crate::registry::DatasourceRegistry;
use reporter_types::{TableSchema, DEFAULT_SCHEMA};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A table named more than once with no explicit schema to pick from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguityError {
    pub identity: String,
    pub table: String,
    /// Sorted, without duplicates
    pub schemas: Vec<String>,
}

impl AmbiguityError {
    /// Explicit references, one per candidate schema.
    pub fn suggestions(&self) -> Vec<String> {
        self.schemas
            .iter()
            .map(|schema| format!("{}:{}.{}", self.identity, schema, self.table))
            .collect()
    }
}

impl fmt::Display for AmbiguityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table '{}' is ambiguous in datasource '{}': found in schemas [{}]. Use an explicit reference:",
            self.table,
            self.identity,
            self.schemas.join(", ")
        )?;
        for suggestion in self.suggestions() {
            write!(f, "\n  {suggestion}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AmbiguityError {}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No schema snapshot exists for the identity.
    #[error("no schema information for datasource '{0}'")]
    UnknownDatasource(String),

    #[error("table '{table}' not found in schema '{schema}' of datasource '{identity}'")]
    NotFoundInSchema {
        identity: String,
        schema: String,
        table: String,
    },

    #[error("table '{table}' not found in datasource '{identity}'")]
    NotFound { identity: String, table: String },

    #[error(transparent)]
    Ambiguous(#[from] AmbiguityError),

    #[error("invalid table reference: '{0}'")]
    InvalidReference(String),
}

/// `[identity:][schema.]table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    pub identity: Option<String>,
    pub schema: Option<String>,
    pub table: String,
}

impl TableReference {
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        let invalid = || ResolveError::InvalidReference(raw.to_string());

        let (identity, rest) = match raw.split_once(':') {
            Some((identity, _)) if identity.trim().is_empty() => return Err(invalid()),
            Some((identity, rest)) => (Some(identity.trim().to_string()), rest),
            None => (None, raw),
        };
        let (schema, table) = match rest.split_once('.') {
            Some((schema, _)) if schema.trim().is_empty() => return Err(invalid()),
            Some((schema, table)) => (Some(schema.trim().to_string()), table.trim()),
            None => (None, rest.trim()),
        };
        if table.is_empty() || table.contains('.') {
            return Err(invalid());
        }

        Ok(Self { identity, schema, table: table.to_string() })
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(identity) = &self.identity {
            write!(f, "{identity}:")?;
        }
        if let Some(schema) = &self.schema {
            write!(f, "{schema}.")?;
        }
        f.write_str(&self.table)
    }
}

/// Resolve the schema holding `table` within one datasource's snapshot.
///
/// Pure: the same snapshot and arguments always give the same answer.
pub fn resolve_schema(
    identity: &str,
    tables: &[TableSchema],
    explicit_schema: Option<&str>,
    table: &str,
) -> Result<String, ResolveError> {
    if let Some(schema) = explicit_schema {
        return if tables.iter().any(|t| t.schema_name == schema && t.table_name == table) {
            Ok(schema.to_string())
        } else {
            Err(ResolveError::NotFoundInSchema {
                identity: identity.to_string(),
                schema: schema.to_string(),
                table: table.to_string(),
            })
        };
    }

    let candidates: BTreeSet<&str> = tables
        .iter()
        .filter(|t| t.table_name == table)
        .map(|t| t.schema_name.as_str())
        .collect();

    match candidates.len() {
        0 => Err(ResolveError::NotFound {
            identity: identity.to_string(),
            table: table.to_string(),
        }),
        1 => Ok(candidates.into_iter().next().unwrap_or_default().to_string()),
        _ if candidates.contains(DEFAULT_SCHEMA) => Ok(DEFAULT_SCHEMA.to_string()),
        _ => Err(AmbiguityError {
            identity: identity.to_string(),
            table: table.to_string(),
            schemas: candidates.into_iter().map(str::to_string).collect(),
        }
        .into()),
    }
}

/// Per-datasource schema snapshots, resolved without touching the registry.
#[derive(Debug, Clone, Default)]
pub struct SchemaResolver {
    snapshots: HashMap<String, Arc<Vec<TableSchema>>>,
}

impl SchemaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the cached snapshots of every registered datasource.
    pub async fn from_registry(registry: &DatasourceRegistry) -> Self {
        let snapshots = registry
            .get_all()
            .await
            .into_iter()
            .filter_map(|(identity, handle)| handle.table_schemas().cloned().map(|t| (identity, t)))
            .collect();
        Self { snapshots }
    }

    pub fn insert(&mut self, identity: impl Into<String>, tables: Arc<Vec<TableSchema>>) {
        self.snapshots.insert(identity.into(), tables);
    }

    #[must_use]
    pub fn with_datasource(mut self, identity: impl Into<String>, tables: Vec<TableSchema>) -> Self {
        self.insert(identity, Arc::new(tables));
        self
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.snapshots.contains_key(identity)
    }

    pub fn resolve(
        &self,
        identity: &str,
        explicit_schema: Option<&str>,
        table: &str,
    ) -> Result<String, ResolveError> {
        let tables = self
            .snapshots
            .get(identity)
            .ok_or_else(|| ResolveError::UnknownDatasource(identity.to_string()))?;
        resolve_schema(identity, tables, explicit_schema, table)
    }

    /// Resolve a parsed reference. References without an identity use
    /// `default_identity`.
    pub fn resolve_reference(
        &self,
        reference: &TableReference,
        default_identity: &str,
    ) -> Result<String, ResolveError> {
        let identity = reference.identity.as_deref().unwrap_or(default_identity);
        self.resolve(identity, reference.schema.as_deref(), &reference.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::table;

    fn resolver() -> SchemaResolver {
        SchemaResolver::new()
            .with_datasource(
                "db",
                vec![
                    table("payment", "transactions", &["id"]),
                    table("transfer", "transactions", &["id"]),
                    table("payment", "refunds", &["id"]),
                ],
            )
            .with_datasource(
                "ledger",
                vec![table("public", "accounts", &["id"]), table("audit", "accounts", &["id"])],
            )
    }

    #[test]
    fn test_single_match() {
        assert_eq!(resolver().resolve("db", None, "refunds").unwrap(), "payment");
        assert_eq!(resolver().resolve("db", None, "refunds").unwrap(), "payment");
    }

    #[test]
    fn test_public_wins_among_many() {
        assert_eq!(resolver().resolve("ledger", None, "accounts").unwrap(), "public");
    }

    #[test]
    fn test_ambiguity_lists_candidates() {
        let err = resolver().resolve("db", None, "transactions").unwrap_err();

        let ResolveError::Ambiguous(ambiguity) = &err else {
            panic!("expected ambiguity, got {err:?}");
        };
        assert_eq!(ambiguity.schemas, ["payment", "transfer"]);

        let message = err.to_string();
        assert!(message.contains("payment"));
        assert!(message.contains("transfer"));
        assert!(message.lines().any(|l| l.trim() == "db:payment.transactions"));
        assert!(message.lines().any(|l| l.trim() == "db:transfer.transactions"));
    }

    #[test]
    fn test_explicit_schema() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("db", Some("transfer"), "transactions").unwrap(), "transfer");
        assert!(matches!(
            resolver.resolve("db", Some("transfer"), "refunds"),
            Err(ResolveError::NotFoundInSchema { .. })
        ));
    }

    #[test]
    fn test_not_found_and_unknown_identity() {
        let resolver = resolver();
        assert!(matches!(resolver.resolve("db", None, "ghosts"), Err(ResolveError::NotFound { .. })));
        assert_eq!(
            resolver.resolve("nope", None, "transactions"),
            Err(ResolveError::UnknownDatasource("nope".to_string()))
        );
    }

    #[test]
    fn test_document_tables_resolve_to_empty_schema() {
        let tables = vec![table("", "events", &["_id"])];
        assert_eq!(resolve_schema("mongo", &tables, None, "events").unwrap(), "");
    }

    #[test]
    fn test_parse_reference() {
        let full = TableReference::parse("db:payment.transactions").unwrap();
        assert_eq!(full.identity.as_deref(), Some("db"));
        assert_eq!(full.schema.as_deref(), Some("payment"));
        assert_eq!(full.table, "transactions");
        assert_eq!(full.to_string(), "db:payment.transactions");

        let bare = TableReference::parse("transactions").unwrap();
        assert_eq!(bare, TableReference { identity: None, schema: None, table: "transactions".into() });

        for raw in ["", ":t", "db:", ".t", "a.b.c", "db:s."] {
            assert!(TableReference::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn test_resolve_reference_uses_default_identity() {
        let resolver = resolver();
        let reference = TableReference::parse("audit.accounts").unwrap();
        assert_eq!(resolver.resolve_reference(&reference, "ledger").unwrap(), "audit");

        let reference = TableReference::parse("db:payment.refunds").unwrap();
        assert_eq!(resolver.resolve_reference(&reference, "ledger").unwrap(), "payment");
    }
}
