//! Cell values returned by datasource queries.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A single query result row keyed by column name.
pub type QueryRow = BTreeMap<String, CellValue>;

/// Value of one result cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Scalar or parsed JSON document
    Json(Value),
    /// Byte payload that is not a JSON document
    Bytes(Vec<u8>),
}

impl CellValue {
    /// Interpret a byte payload, eagerly parsing JSON documents.
    ///
    /// Objects, arrays and strings become their JSON value; anything that
    /// fails to parse is returned as raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value @ (Value::Object(_) | Value::Array(_) | Value::String(_))) => {
                CellValue::Json(value)
            },
            _ => CellValue::Bytes(bytes),
        }
    }

    pub fn null() -> Self {
        CellValue::Json(Value::Null)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            CellValue::Json(value) => Some(value),
            CellValue::Bytes(_) => None,
        }
    }
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        CellValue::Json(value)
    }
}
