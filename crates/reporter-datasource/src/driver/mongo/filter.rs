//! BSON filter, projection and value conversion for the document driver.

use crate::driver::error::{DriverError, DriverResult};
use crate::driver::validation::{is_date_field, normalize_condition};
use chrono::NaiveDate;
use mongodb::bson::{self, doc, Bson, Document};
use reporter_types::{CellValue, FilterCondition, QueryRow};
use serde_json::Value;

/// `{field: {$in: [...]}}` per filter entry, combined with `$and`.
pub(crate) fn in_filter(filters: &[(&str, &Vec<Value>)]) -> DriverResult<Document> {
    let mut clauses = Vec::new();
    for (field, values) in filters {
        if values.is_empty() {
            continue;
        }
        clauses.push(doc! { *field: { "$in": to_bson_list(field, values)? } });
    }
    Ok(combine(clauses))
}

/// One clause per predicate, combined with `$and`.
pub(crate) fn advanced_filter(filters: &[(&str, &FilterCondition)]) -> DriverResult<Document> {
    let mut clauses = Vec::new();
    for (field, condition) in filters {
        let condition = normalize_condition(field, condition)?;

        match condition.eq.as_slice() {
            [] => {},
            [single] => clauses.push(doc! { *field: { "$eq": to_bson(field, single)? } }),
            many => clauses.push(doc! { *field: { "$in": to_bson_list(field, many)? } }),
        }
        for (op, values) in [
            ("$gt", &condition.gt),
            ("$gte", &condition.gte),
            ("$lt", &condition.lt),
            ("$lte", &condition.lte),
        ] {
            if let Some(value) = values.first() {
                clauses.push(doc! { *field: { op: to_bson(field, value)? } });
            }
        }
        if let [low, high] = condition.between.as_slice() {
            clauses.push(doc! {
                *field: { "$gte": to_bson(field, low)?, "$lte": to_bson(field, high)? }
            });
        }
        if !condition.in_values.is_empty() {
            clauses.push(doc! { *field: { "$in": to_bson_list(field, &condition.in_values)? } });
        }
        if !condition.nin.is_empty() {
            clauses.push(doc! { *field: { "$nin": to_bson_list(field, &condition.nin)? } });
        }
    }
    Ok(combine(clauses))
}

fn combine(mut clauses: Vec<Document>) -> Document {
    match clauses.len() {
        0 => Document::new(),
        1 => clauses.remove(0),
        _ => doc! { "$and": clauses },
    }
}

/// Projection for the requested fields; `_id` is suppressed unless asked for.
pub(crate) fn projection(fields: &[String]) -> Option<Document> {
    if fields.is_empty() {
        return None;
    }
    let mut projection = Document::new();
    for field in fields {
        projection.insert(field.as_str(), 1);
    }
    if !fields.iter().any(|f| f == "_id") {
        projection.insert("_id", 0);
    }
    Some(projection)
}

fn to_bson_list(field: &str, values: &[Value]) -> DriverResult<Vec<Bson>> {
    values.iter().map(|v| to_bson(field, v)).collect()
}

/// Date fields compare as BSON dates when the value is an RFC 3339 string
/// or a bare `YYYY-MM-DD` (midnight UTC).
fn to_bson(field: &str, value: &Value) -> DriverResult<Bson> {
    if let Value::String(raw) = value {
        if is_date_field(field) {
            if let Some(date) = parse_date(raw) {
                return Ok(Bson::DateTime(date));
            }
        }
    }
    bson::to_bson(value)
        .map_err(|e| DriverError::Validation(format!("invalid value for field {}: {}", field, e)))
}

fn parse_date(raw: &str) -> Option<bson::DateTime> {
    if let Ok(date) = bson::DateTime::parse_rfc3339_str(raw) {
        return Some(date);
    }
    let midnight = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0)?;
    Some(bson::DateTime::from_millis(midnight.and_utc().timestamp_millis()))
}

/// Convert a fetched document to a row.
pub(crate) fn document_to_row(document: Document) -> QueryRow {
    document.into_iter().map(|(key, value)| (key, bson_to_cell(value))).collect()
}

fn bson_to_cell(value: Bson) -> CellValue {
    match value {
        Bson::Binary(binary) => CellValue::from_bytes(binary.bytes),
        other => CellValue::Json(bson_to_json(other)),
    }
}

fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        Bson::DateTime(date) => match date.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::from(date.timestamp_millis()),
        },
        Bson::Document(document) => Value::Object(
            document.into_iter().map(|(k, v)| (k, bson_to_json(v))).collect(),
        ),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}

/// Shallow column type name for schema inference.
pub(crate) fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        Bson::Timestamp(_) => "timestamp",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_filter_single_and_many() {
        let ids = vec![json!("a"), json!("b")];
        assert_eq!(in_filter(&[("status", &ids)]).unwrap(), doc! { "status": { "$in": ["a", "b"] } });

        let kinds = vec![json!(1)];
        assert_eq!(
            in_filter(&[("status", &ids), ("kind", &kinds)]).unwrap(),
            doc! { "$and": [ { "status": { "$in": ["a", "b"] } }, { "kind": { "$in": [1_i64] } } ] }
        );
        assert_eq!(in_filter(&[]).unwrap(), Document::new());
    }

    #[test]
    fn test_advanced_filter_between_and_eq() {
        let amount = FilterCondition {
            eq: vec![json!(10)],
            between: vec![json!(1), json!(50)],
            ..Default::default()
        };
        let filter = advanced_filter(&[("amount", &amount)]).unwrap();
        assert_eq!(
            filter,
            doc! { "$and": [
                { "amount": { "$eq": 10_i64 } },
                { "amount": { "$gte": 1_i64, "$lte": 50_i64 } },
            ] }
        );
    }

    #[test]
    fn test_date_bounds_become_bson_dates() {
        let created = FilterCondition {
            between: vec![json!("2024-01-01T00:00:00Z"), json!("2024-01-31")],
            ..Default::default()
        };
        let filter = advanced_filter(&[("created_at", &created)]).unwrap();
        let range = filter.get_document("created_at").unwrap();
        assert!(matches!(range.get("$gte"), Some(Bson::DateTime(_))));
        assert!(matches!(range.get("$lte"), Some(Bson::DateTime(_))));
    }

    #[test]
    fn test_date_only_values_compare_as_dates() {
        let created = FilterCondition {
            gt: vec![json!("2023-12-31")],
            between: vec![json!("2024-01-01"), json!("2024-01-31")],
            ..Default::default()
        };
        let filter = advanced_filter(&[("created_at", &created)]).unwrap();

        let clauses = filter.get_array("$and").unwrap();
        let lower = clauses[0].as_document().unwrap().get_document("created_at").unwrap();
        assert_eq!(
            lower.get("$gt"),
            Some(&Bson::DateTime(bson::DateTime::parse_rfc3339_str("2023-12-31T00:00:00Z").unwrap()))
        );
        let range = clauses[1].as_document().unwrap().get_document("created_at").unwrap();
        assert_eq!(
            range.get("$gte"),
            Some(&Bson::DateTime(bson::DateTime::parse_rfc3339_str("2024-01-01T00:00:00Z").unwrap()))
        );
        assert_eq!(
            range.get("$lte"),
            Some(&Bson::DateTime(bson::DateTime::parse_rfc3339_str("2024-01-31T23:59:59.999Z").unwrap()))
        );
    }

    #[test]
    fn test_date_only_string_on_plain_field_stays_string() {
        let code = FilterCondition { eq: vec![json!("2024-01-01")], ..Default::default() };
        let filter = advanced_filter(&[("batch_code", &code)]).unwrap();
        assert_eq!(filter, doc! { "batch_code": { "$eq": "2024-01-01" } });
    }

    #[test]
    fn test_advanced_filter_rejects_bad_uuid() {
        let condition = FilterCondition { eq: vec![json!("nope")], ..Default::default() };
        assert!(advanced_filter(&[("customer_id", &condition)]).is_err());
    }

    #[test]
    fn test_projection() {
        assert!(projection(&[]).is_none());
        let p = projection(&["name".to_string(), "address.city".to_string()]).unwrap();
        assert_eq!(p, doc! { "name": 1, "address.city": 1, "_id": 0 });
        let p = projection(&["_id".to_string()]).unwrap();
        assert_eq!(p, doc! { "_id": 1 });
    }

    #[test]
    fn test_document_to_row() {
        let id = bson::oid::ObjectId::new();
        let row = document_to_row(doc! {
            "_id": id,
            "name": "acme",
            "tags": ["a", "b"],
            "raw": Bson::Binary(bson::Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: br#"{"k":"v"}"#.to_vec(),
            }),
        });
        assert_eq!(row["_id"], CellValue::Json(json!(id.to_hex())));
        assert_eq!(row["name"], CellValue::Json(json!("acme")));
        assert_eq!(row["tags"], CellValue::Json(json!(["a", "b"])));
        assert_eq!(row["raw"], CellValue::Json(json!({"k": "v"})));
    }
}
