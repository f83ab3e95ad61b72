//! Request validation shared by both drivers.
//!
//! Field-name heuristics:
//! - a field is treated as a UUID column when its lowercase name is `id` or
//!   contains `_id`; every string value filtering it must parse as a UUID.
//! - a field is treated as a date column when its lowercase name ends with
//!   `_at` or contains `date` or `time`. For such fields a date-only
//!   `between` upper bound (`YYYY-MM-DD`) is promoted to `T23:59:59.999Z` so
//!   the whole day is included. No other predicate is rewritten.

use super::error::{DriverError, DriverResult};
use super::TableQuery;
use reporter_types::{FilterCondition, TableSchema};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

const END_OF_DAY: &str = "T23:59:59.999Z";

/// Find the queried table in the snapshot and check every requested field.
pub(crate) fn validate_query<'a>(query: &TableQuery<'a>) -> DriverResult<&'a TableSchema> {
    let table = query
        .snapshot
        .iter()
        .find(|t| {
            t.table_name == query.table
                && query.schema_name.map_or(true, |schema| t.schema_name == schema)
        })
        .ok_or_else(|| {
            DriverError::Validation(match query.schema_name {
                Some(schema) => format!("table {}.{} does not exist", schema, query.table),
                None => format!("table {} does not exist", query.table),
            })
        })?;

    for field in query.fields {
        if table.column_for_field(field).is_none() {
            return Err(DriverError::Validation(format!(
                "field {} does not exist in table {}",
                field, query.table
            )));
        }
    }
    Ok(table)
}

/// Filter entries whose field is a recognized column, in field order.
pub(crate) fn recognized_filters<'f, T>(
    table: &TableSchema,
    filter: &'f HashMap<String, T>,
) -> Vec<(&'f str, &'f T)> {
    let mut entries: Vec<(&str, &T)> = filter
        .iter()
        .filter(|(field, _)| table.column_for_field(field).is_some())
        .map(|(field, value)| (field.as_str(), value))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

pub(crate) fn is_uuid_field(field: &str) -> bool {
    let lower = field.to_ascii_lowercase();
    lower == "id" || lower.contains("_id")
}

pub(crate) fn is_date_field(field: &str) -> bool {
    let lower = field.to_ascii_lowercase();
    lower.ends_with("_at") || lower.contains("date") || lower.contains("time")
}

fn is_date_only(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes.iter().enumerate().all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
}

fn validate_uuid_values(field: &str, values: &[Value]) -> DriverResult<()> {
    for value in values {
        if let Value::String(raw) = value {
            if raw.len() != 36 || Uuid::parse_str(raw).is_err() {
                return Err(DriverError::Validation(format!(
                    "invalid UUID format for field {}: {}",
                    field, raw
                )));
            }
        }
    }
    Ok(())
}

fn expect_arity(field: &str, predicate: &str, values: &[Value], expected: usize) -> DriverResult<()> {
    if values.is_empty() || values.len() == expected {
        return Ok(());
    }
    Err(DriverError::Validation(format!(
        "{} filter on field {} requires exactly {} value(s), got {}",
        predicate,
        field,
        expected,
        values.len()
    )))
}

/// Check predicate arity and UUID formats, and apply the end-of-day
/// promotion. Returns the condition to execute.
pub(crate) fn normalize_condition(
    field: &str,
    condition: &FilterCondition,
) -> DriverResult<FilterCondition> {
    for predicate in ["gt", "gte", "lt", "lte"] {
        let values = condition
            .predicates()
            .find(|(name, _)| *name == predicate)
            .map_or(&[][..], |(_, values)| values);
        expect_arity(field, predicate, values, 1)?;
    }
    expect_arity(field, "between", &condition.between, 2)?;

    if is_uuid_field(field) {
        for (_, values) in condition.predicates() {
            validate_uuid_values(field, values)?;
        }
    }

    let mut normalized = condition.clone();
    if is_date_field(field) {
        if let Some(Value::String(upper)) = normalized.between.get_mut(1) {
            if is_date_only(upper) {
                upper.push_str(END_OF_DAY);
            }
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reporter_types::ColumnInformation;
    use serde_json::json;

    fn table() -> TableSchema {
        let column = |name: &str, data_type: &str| ColumnInformation {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: false,
            is_primary_key: name == "id",
        };
        TableSchema {
            schema_name: "payment".to_string(),
            table_name: "transactions".to_string(),
            columns: vec![
                column("id", "uuid"),
                column("amount", "numeric"),
                column("created_at", "timestamp with time zone"),
                column("metadata", "jsonb"),
            ],
        }
    }

    #[test]
    fn test_validate_query_accepts_dotted_fields() {
        let snapshot = vec![table()];
        let fields = vec!["id".to_string(), "metadata.customer".to_string()];
        let query = TableQuery {
            snapshot: &snapshot,
            schema_name: Some("payment"),
            table: "transactions",
            fields: &fields,
        };
        assert_eq!(validate_query(&query).unwrap().table_name, "transactions");
    }

    #[test]
    fn test_validate_query_rejects_unknown_field_and_table() {
        let snapshot = vec![table()];
        let fields = vec!["nope".to_string()];
        let query = TableQuery {
            snapshot: &snapshot,
            schema_name: None,
            table: "transactions",
            fields: &fields,
        };
        let err = validate_query(&query).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("nope"));

        let query = TableQuery {
            snapshot: &snapshot,
            schema_name: Some("transfer"),
            table: "transactions",
            fields: &[],
        };
        assert!(validate_query(&query).is_err());
    }

    #[test]
    fn test_recognized_filters_drop_unknown_columns() {
        let mut filter = HashMap::new();
        filter.insert("id".to_string(), vec![json!(1)]);
        filter.insert("bogus".to_string(), vec![json!(2)]);
        filter.insert("amount".to_string(), vec![json!(3)]);
        let t = table();
        let fields: Vec<&str> = recognized_filters(&t, &filter).into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["amount", "id"]);
    }

    #[test]
    fn test_field_heuristics() {
        assert!(is_uuid_field("ID"));
        assert!(is_uuid_field("account_id"));
        assert!(!is_uuid_field("identity"));
        assert!(is_date_field("created_at"));
        assert!(is_date_field("settlementDate"));
        assert!(is_date_field("timestamp"));
        assert!(!is_date_field("amount"));
    }

    #[test]
    fn test_arity_violations() {
        let condition = FilterCondition { gt: vec![json!(1), json!(2)], ..Default::default() };
        let err = normalize_condition("amount", &condition).unwrap_err();
        assert!(err.to_string().contains("gt filter on field amount"));

        let condition = FilterCondition { between: vec![json!(1)], ..Default::default() };
        assert!(normalize_condition("amount", &condition).is_err());
    }

    #[test]
    fn test_uuid_values_are_checked() {
        let condition = FilterCondition {
            in_values: vec![json!("0190f3c2-7a8e-7b4a-9c1d-5e6f7a8b9c0d"), json!("not-a-uuid")],
            ..Default::default()
        };
        let err = normalize_condition("account_id", &condition).unwrap_err();
        assert!(err.to_string().contains("account_id"));
        assert!(err.to_string().contains("not-a-uuid"));

        let numeric = FilterCondition { eq: vec![json!(42)], ..Default::default() };
        assert!(normalize_condition("id", &numeric).is_ok());
    }

    #[test]
    fn test_between_upper_bound_promoted_for_dates() {
        let condition = FilterCondition {
            between: vec![json!("2024-01-01"), json!("2024-01-31")],
            ..Default::default()
        };
        let normalized = normalize_condition("created_at", &condition).unwrap();
        assert_eq!(normalized.between, vec![json!("2024-01-01"), json!("2024-01-31T23:59:59.999Z")]);

        let untouched = normalize_condition("amount", &condition).unwrap();
        assert_eq!(untouched.between[1], json!("2024-01-31"));
    }

    #[test]
    fn test_only_between_is_promoted() {
        let condition = FilterCondition { lte: vec![json!("2024-01-31")], ..Default::default() };
        let normalized = normalize_condition("created_at", &condition).unwrap();
        assert_eq!(normalized.lte, vec![json!("2024-01-31")]);
    }
}
