//! Advanced filter predicates.
//!
//! Wire form:
//!
//! ```json
//! { "eq": [], "gt": [], "gte": [], "lt": [], "lte": [],
//!   "between": [lo, hi], "in": [], "nin": [] }
//! ```
//!
//! Any subset of keys may be present. Absent keys and empty arrays both mean
//! "no constraint under this predicate".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Predicates applied to a single field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// One value means equality, several mean `IN`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub eq: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gt: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gte: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lt: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lte: Vec<Value>,
    /// Exactly two values: inclusive lower and upper bound
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub between: Vec<Value>,
    #[serde(default, rename = "in", skip_serializing_if = "Vec::is_empty")]
    pub in_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nin: Vec<Value>,
}

impl FilterCondition {
    /// True when no predicate carries a value.
    pub fn is_empty(&self) -> bool {
        self.predicates().all(|(_, values)| values.is_empty())
    }

    /// Every predicate with its value list, in wire order.
    pub fn predicates(&self) -> impl Iterator<Item = (&'static str, &[Value])> {
        [
            ("eq", self.eq.as_slice()),
            ("gt", self.gt.as_slice()),
            ("gte", self.gte.as_slice()),
            ("lt", self.lt.as_slice()),
            ("lte", self.lte.as_slice()),
            ("between", self.between.as_slice()),
            ("in", self.in_values.as_slice()),
            ("nin", self.nin.as_slice()),
        ]
        .into_iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_round_trip() {
        let condition = FilterCondition {
            eq: vec![json!("a"), json!("b")],
            between: vec![json!("2024-01-01"), json!("2024-01-31")],
            in_values: vec![json!(1), json!(2)],
            nin: vec![json!(null)],
            ..Default::default()
        };

        let wire = serde_json::to_value(&condition).unwrap();
        assert_eq!(wire["in"], json!([1, 2]));
        assert!(wire.get("gt").is_none());

        let back: FilterCondition = serde_json::from_value(wire).unwrap();
        assert_eq!(back, condition);
    }

    #[test]
    fn test_predicate_subsets_survive_the_wire() {
        let cases = [
            json!({"gt": [5]}),
            json!({"gte": ["2024-01-01"], "lt": ["2024-02-01"]}),
            json!({"lte": [99.5], "nin": ["void", "draft"]}),
            json!({"eq": ["open"], "gt": [0], "lte": [100]}),
            json!({"gt": [1], "gte": [2], "lt": [9], "lte": [8]}),
            json!({"between": ["2024-01-01", "2024-01-31"], "in": ["EU", "US"]}),
            json!({
                "eq": [true], "gt": [1], "gte": [1], "lt": [10], "lte": [10],
                "between": [1, 10], "in": [3, 4], "nin": [null]
            }),
        ];

        for wire in cases {
            let parsed: FilterCondition = serde_json::from_value(wire.clone()).unwrap();
            let mut present: Vec<&str> = parsed
                .predicates()
                .filter(|(_, values)| !values.is_empty())
                .map(|(key, values)| {
                    assert_eq!(json!(values), wire[key], "values under {key}");
                    key
                })
                .collect();
            let mut expected: Vec<&str> = wire.as_object().unwrap().keys().map(String::as_str).collect();
            present.sort_unstable();
            expected.sort_unstable();
            assert_eq!(present, expected);

            assert_eq!(serde_json::to_value(&parsed).unwrap(), wire);
        }
    }

    #[test]
    fn test_empty_arrays_behave_as_absent() {
        let parsed: FilterCondition =
            serde_json::from_str(r#"{"eq": [], "gte": [], "nin": []}"#).unwrap();
        assert!(parsed.is_empty());
        assert_eq!(parsed, FilterCondition::default());
    }

    #[test]
    fn test_partial_object() {
        let parsed: FilterCondition = serde_json::from_str(r#"{"gte": [10]}"#).unwrap();
        assert!(!parsed.is_empty());
        assert_eq!(parsed.gte, vec![json!(10)]);
        assert_eq!(parsed.predicates().filter(|(_, v)| !v.is_empty()).count(), 1);
    }
}
