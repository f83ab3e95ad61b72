//! Row decoding for the relational driver.

use super::sql::{Decode, SelectColumn};
use crate::driver::error::{DriverError, DriverResult};
use reporter_types::{CellValue, QueryRow};
use serde_json::{Number, Value};
use sqlx::postgres::PgRow;
use sqlx::Row;

/// Convert a row into a column-name keyed map.
pub(crate) fn decode_row(row: &PgRow, columns: &[SelectColumn]) -> DriverResult<QueryRow> {
    let mut out = QueryRow::new();
    for column in columns {
        let cell = decode_cell(row, column).map_err(|err| {
            DriverError::Execution(format!("decoding column {}: {}", column.name, err))
        })?;
        out.insert(column.name.clone(), cell);
    }
    Ok(out)
}

fn decode_cell(row: &PgRow, column: &SelectColumn) -> Result<CellValue, sqlx::Error> {
    let name = column.name.as_str();
    let value = match column.decode {
        Decode::Text => row.try_get::<Option<String>, _>(name)?.map(Value::String),
        Decode::Numeric => row.try_get::<Option<String>, _>(name)?.map(|raw| numeric_value(&raw)),
        Decode::Int2 => row.try_get::<Option<i16>, _>(name)?.map(Value::from),
        Decode::Int4 => row.try_get::<Option<i32>, _>(name)?.map(Value::from),
        Decode::Int8 => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
        Decode::Float4 => row.try_get::<Option<f32>, _>(name)?.map(|f| float_value(f64::from(f))),
        Decode::Float8 => row.try_get::<Option<f64>, _>(name)?.map(float_value),
        Decode::Bool => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool),
        Decode::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(name)?
            .map(|id| Value::String(id.to_string())),
        Decode::TimestampTz => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)?
            .map(|ts| Value::String(ts.to_rfc3339())),
        Decode::Timestamp => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(name)?
            .map(|ts| Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Decode::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(name)?
            .map(|d| Value::String(d.to_string())),
        Decode::Json => row.try_get::<Option<Value>, _>(name)?,
        Decode::Bytes => {
            return Ok(row
                .try_get::<Option<Vec<u8>>, _>(name)?
                .map_or_else(CellValue::null, CellValue::from_bytes));
        },
    };
    Ok(value.map_or_else(CellValue::null, CellValue::Json))
}

/// Numeric text keeps full precision as a JSON number when it parses,
/// otherwise (`NaN`, money with a currency sign) it stays text.
fn numeric_value(raw: &str) -> Value {
    match serde_json::from_str::<Number>(raw) {
        Ok(number) => Value::Number(number),
        Err(_) => Value::String(raw.to_string()),
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_value() {
        assert_eq!(numeric_value("12.50"), serde_json::json!(12.5));
        assert_eq!(numeric_value("42"), serde_json::json!(42));
        assert_eq!(numeric_value("NaN"), Value::String("NaN".to_string()));
        assert_eq!(numeric_value("$1,000.00"), Value::String("$1,000.00".to_string()));
    }

    #[test]
    fn test_float_value_rejects_nan() {
        assert_eq!(float_value(f64::NAN), Value::Null);
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
    }
}
