//! SELECT builder for the relational driver.
//!
//! Every filter value is bound as text and cast to the column's declared
//! type, so one bind path covers uuid, timestamp, numeric and text columns.
//! Dotted fields compare against the JSON path below their root column.

use crate::driver::error::{DriverError, DriverResult};
use crate::driver::validation::normalize_condition;
use reporter_types::{quote_identifier, ColumnInformation, FilterCondition, TableSchema};
use serde_json::Value;

/// How a selected column is read back from the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decode {
    Text,
    Numeric,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Bool,
    Uuid,
    TimestampTz,
    Timestamp,
    Date,
    Json,
    Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectColumn {
    pub name: String,
    pub decode: Decode,
}

/// A built statement with its text parameters, in `$n` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statement {
    pub sql: String,
    pub params: Vec<Option<String>>,
    pub columns: Vec<SelectColumn>,
}

struct Builder<'t> {
    table: &'t TableSchema,
    clauses: Vec<String>,
    params: Vec<Option<String>>,
}

impl<'t> Builder<'t> {
    fn new(table: &'t TableSchema) -> Self {
        Self { table, clauses: Vec::new(), params: Vec::new() }
    }

    /// Left-hand side of a comparison and the type values are cast to.
    fn target(&self, field: &str) -> DriverResult<(String, Option<String>)> {
        let column = self.table.column_for_field(field).ok_or_else(|| {
            DriverError::Validation(format!(
                "field {} does not exist in table {}",
                field, self.table.table_name
            ))
        })?;

        if column.name != field {
            let path: Vec<&str> = field.split('.').skip(1).collect();
            let literal = format!("{{{}}}", path.join(",")).replace('\'', "''");
            return Ok((format!("({} #>> '{}')", quote_identifier(&column.name), literal), None));
        }

        let ident = quote_identifier(&column.name);
        match column.data_type.as_str() {
            "USER-DEFINED" | "ARRAY" => Ok((format!("{}::text", ident), None)),
            data_type => Ok((ident, Some(cast_type(data_type).to_string()))),
        }
    }

    fn placeholder(&mut self, value: &Value, cast: Option<&str>) -> String {
        self.params.push(value_as_text(value));
        let n = self.params.len();
        match cast {
            Some(data_type) => format!("CAST(${} AS {})", n, data_type),
            None => format!("${}", n),
        }
    }

    fn push_list(&mut self, field: &str, values: &[Value], negate: bool) -> DriverResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let (lhs, cast) = self.target(field)?;
        let placeholders: Vec<String> =
            values.iter().map(|v| self.placeholder(v, cast.as_deref())).collect();
        let op = if negate { "NOT IN" } else { "IN" };
        self.clauses.push(format!("{} {} ({})", lhs, op, placeholders.join(", ")));
        Ok(())
    }

    fn push_compare(&mut self, field: &str, op: &str, value: &Value) -> DriverResult<()> {
        let (lhs, cast) = self.target(field)?;
        let rhs = self.placeholder(value, cast.as_deref());
        self.clauses.push(format!("{} {} {}", lhs, op, rhs));
        Ok(())
    }

    fn push_condition(&mut self, field: &str, condition: &FilterCondition) -> DriverResult<()> {
        let condition = normalize_condition(field, condition)?;

        match condition.eq.as_slice() {
            [] => {},
            [single] => self.push_compare(field, "=", single)?,
            many => self.push_list(field, many, false)?,
        }
        for (op, values) in [(">", &condition.gt), (">=", &condition.gte), ("<", &condition.lt), ("<=", &condition.lte)] {
            if let Some(value) = values.first() {
                self.push_compare(field, op, value)?;
            }
        }
        if let [low, high] = condition.between.as_slice() {
            let (lhs, cast) = self.target(field)?;
            let low = self.placeholder(low, cast.as_deref());
            let high = self.placeholder(high, cast.as_deref());
            self.clauses.push(format!("{} BETWEEN {} AND {}", lhs, low, high));
        }
        self.push_list(field, &condition.in_values, false)?;
        self.push_list(field, &condition.nin, true)?;
        Ok(())
    }

    fn finish(self, fields: &[String]) -> Statement {
        let columns = selected_columns(self.table, fields);
        let select_list: Vec<String> = columns
            .iter()
            .filter_map(|c| self.table.column(&c.name).map(|info| select_expr(info, c.decode)))
            .collect();

        let mut sql = format!(
            "SELECT {} FROM {}",
            select_list.join(", "),
            self.table.qualified_name()
        );
        if !self.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
        Statement { sql, params: self.params, columns }
    }
}

/// `SELECT … WHERE field IN (…) AND …` for plain filters.
pub(crate) fn build_in_query(
    table: &TableSchema,
    fields: &[String],
    filters: &[(&str, &Vec<Value>)],
) -> DriverResult<Statement> {
    let mut builder = Builder::new(table);
    for (field, values) in filters {
        builder.push_list(field, values, false)?;
    }
    Ok(builder.finish(fields))
}

/// `SELECT … WHERE <predicates>` for advanced filters.
pub(crate) fn build_advanced_query(
    table: &TableSchema,
    fields: &[String],
    filters: &[(&str, &FilterCondition)],
) -> DriverResult<Statement> {
    let mut builder = Builder::new(table);
    for (field, condition) in filters {
        builder.push_condition(field, condition)?;
    }
    Ok(builder.finish(fields))
}

/// Root columns to select, deduplicated, in request order. Empty `fields`
/// selects the whole table.
fn selected_columns(table: &TableSchema, fields: &[String]) -> Vec<SelectColumn> {
    let mut names: Vec<&str> = Vec::new();
    if fields.is_empty() {
        names.extend(table.columns.iter().map(|c| c.name.as_str()));
    } else {
        for field in fields {
            if let Some(column) = table.column_for_field(field) {
                if !names.contains(&column.name.as_str()) {
                    names.push(&column.name);
                }
            }
        }
    }

    names
        .into_iter()
        .filter_map(|name| table.column(name))
        .map(|c| SelectColumn { name: c.name.clone(), decode: decode_for(&c.data_type) })
        .collect()
}

pub(crate) fn decode_for(data_type: &str) -> Decode {
    match data_type {
        "smallint" => Decode::Int2,
        "integer" => Decode::Int4,
        "bigint" => Decode::Int8,
        "real" => Decode::Float4,
        "double precision" => Decode::Float8,
        "numeric" | "decimal" | "money" => Decode::Numeric,
        "boolean" => Decode::Bool,
        "uuid" => Decode::Uuid,
        "timestamp with time zone" => Decode::TimestampTz,
        "timestamp without time zone" => Decode::Timestamp,
        "date" => Decode::Date,
        "json" | "jsonb" | "ARRAY" => Decode::Json,
        "bytea" => Decode::Bytes,
        _ => Decode::Text,
    }
}

fn select_expr(column: &ColumnInformation, decode: Decode) -> String {
    let ident = quote_identifier(&column.name);
    match (decode, column.data_type.as_str()) {
        (Decode::Json, "ARRAY") => format!("to_jsonb({}) AS {}", ident, ident),
        (Decode::Numeric | Decode::Text, _) => format!("{}::text AS {}", ident, ident),
        _ => ident,
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Cast target for a catalog `data_type`. Bare `character` and `bit` mean
/// length 1, so the unbounded forms are used instead.
fn cast_type(data_type: &str) -> &str {
    match data_type {
        "character" => "bpchar",
        "bit" => "varbit",
        other => other,
    }
}
