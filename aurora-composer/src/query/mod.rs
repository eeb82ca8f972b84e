//! Query and filter engine
//!
//! A predicate is a dictionary of optional conditions. It compiles into a
//! [`Query`] of ANDed clauses evaluated against the flat table of an
//! inventory.
//!
//! ```text
//! { "from": "2023-01-01", "to": "2023-01-31", "group": "trial1",
//!   "specs.case": "CR2032", "metadata.batch": ["230101", "230102"] }
//! ```
//!
//! `from`/`to` bound `metadata.creation_datetime` inclusively, `group`
//! requires membership in `metadata.groups`, and every other key is an
//! equality (scalar) or membership (list) condition on that column. Empty
//! values are ignored.

pub mod facets;

pub use facets::{compute_facet, compute_facets, FacetOption, FacetPanel};

use crate::error::{ComposerError, ComposerResult};
use crate::inventory::table::{Cell, Row, Table, DATETIME_COLUMN, GROUPS_COLUMN};
use aurora_common::time::{format_datetime, parse_datetime};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const FROM_KEY: &str = "from";
pub const TO_KEY: &str = "to";
pub const GROUP_KEY: &str = "group";

/// Condition on one column
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Equals(Cell),
    OneOf(Vec<Cell>),
}

/// Dictionary-shaped filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
    pub group: Option<String>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object, dropping null and empty values
    ///
    /// Dates may be given as `YYYY-MM-DD` (whole day) or `YYYY-MM-DD HH:MM:SS`.
    pub fn from_json(value: &Value) -> ComposerResult<Self> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            _ => {
                return Err(ComposerError::Validation(
                    "a filter must be a JSON object".to_string(),
                ))
            }
        };

        let mut predicate = Self::default();
        for (key, raw) in map {
            if is_empty(raw) {
                continue;
            }
            match key.as_str() {
                FROM_KEY => predicate.from = Some(parse_bound(raw, false)?),
                TO_KEY => predicate.to = Some(parse_bound(raw, true)?),
                GROUP_KEY => {
                    predicate.group = Some(match raw {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                }
                column => {
                    let condition = match raw {
                        Value::Array(items) => FieldValue::OneOf(
                            items.iter().filter(|v| !is_empty(v)).map(Cell::from_json).collect(),
                        ),
                        scalar => FieldValue::Equals(Cell::from_json(scalar)),
                    };
                    predicate.fields.insert(column.to_string(), condition);
                }
            }
        }
        Ok(predicate)
    }

    pub fn with_from(mut self, from: NaiveDateTime) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_to(mut self, to: NaiveDateTime) -> Self {
        self.to = Some(to);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_equals(mut self, column: impl Into<String>, value: impl Into<Cell>) -> Self {
        self.fields.insert(column.into(), FieldValue::Equals(value.into()));
        self
    }

    pub fn with_one_of(mut self, column: impl Into<String>, values: Vec<Cell>) -> Self {
        self.fields.insert(column.into(), FieldValue::OneOf(values));
        self
    }

    /// Same predicate without any condition on `field`
    ///
    /// The group column also drops `group`; the creation-time column also
    /// drops `from` and `to`.
    pub fn without(&self, field: &str) -> Self {
        let mut copy = self.clone();
        copy.fields.remove(field);
        if field == GROUPS_COLUMN || field == GROUP_KEY {
            copy.group = None;
        }
        if field == DATETIME_COLUMN {
            copy.from = None;
            copy.to = None;
        }
        copy
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none() && self.group.is_none() && self.fields.is_empty()
    }

    pub fn compile(&self) -> Query {
        let mut clauses = Vec::new();
        if let Some(from) = self.from {
            clauses.push(Clause::From(from));
        }
        if let Some(to) = self.to {
            clauses.push(Clause::To(to));
        }
        if let Some(group) = &self.group {
            clauses.push(Clause::InGroup(group.clone()));
        }
        for (column, condition) in &self.fields {
            clauses.push(match condition {
                FieldValue::Equals(v) => Clause::Eq(column.clone(), v.clone()),
                FieldValue::OneOf(vs) => Clause::In(column.clone(), vs.clone()),
            });
        }
        Query { clauses }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_empty),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn parse_bound(value: &Value, end_of_day: bool) -> ComposerResult<NaiveDateTime> {
    let text = value
        .as_str()
        .ok_or_else(|| ComposerError::Validation(format!("date expected, got {}", value)))?
        .trim();
    if let Some(dt) = parse_datetime(text) {
        return Ok(dt);
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| ComposerError::Validation(format!("invalid date {:?}", text)))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.ok_or_else(|| ComposerError::Validation(format!("invalid date {:?}", text)))
}

/// A compiled condition
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    From(NaiveDateTime),
    To(NaiveDateTime),
    InGroup(String),
    Eq(String, Cell),
    In(String, Vec<Cell>),
}

impl Clause {
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Clause::From(from) => row.get(DATETIME_COLUMN).as_datetime().is_some_and(|dt| dt >= from),
            Clause::To(to) => row.get(DATETIME_COLUMN).as_datetime().is_some_and(|dt| dt <= to),
            Clause::InGroup(label) => row.get(GROUPS_COLUMN).as_set().is_some_and(|g| g.contains(label)),
            Clause::Eq(column, value) => row.get(column) == value,
            Clause::In(column, values) => values.contains(row.get(column)),
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::From(dt) => write!(f, "`{}` >= '{}'", DATETIME_COLUMN, format_datetime(dt)),
            Clause::To(dt) => write!(f, "`{}` <= '{}'", DATETIME_COLUMN, format_datetime(dt)),
            Clause::InGroup(label) => write!(f, "{:?} in `{}`", label, GROUPS_COLUMN),
            Clause::Eq(column, value) => write!(f, "`{}` == {}", column, value.to_literal()),
            Clause::In(column, values) => {
                let items: Vec<String> = values.iter().map(Cell::to_literal).collect();
                write!(f, "`{}` in [{}]", column, items.join(", "))
            }
        }
    }
}

/// Columns to return from a query
#[derive(Debug, Clone, PartialEq)]
pub struct Projection(Vec<String>);

impl Projection {
    pub fn columns(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for Projection {
    fn from(column: &str) -> Self {
        Projection(vec![column.to_string()])
    }
}

impl From<Vec<String>> for Projection {
    fn from(columns: Vec<String>) -> Self {
        Projection(columns)
    }
}

impl From<&[&str]> for Projection {
    fn from(columns: &[&str]) -> Self {
        Projection(columns.iter().map(|c| c.to_string()).collect())
    }
}

/// ANDed clauses; an empty query matches every row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.clauses.iter().all(|c| c.matches(row))
    }

    pub fn evaluate(&self, table: &Table, projection: Option<&Projection>) -> Table {
        let result = table.filter(|row| self.matches(row));
        match projection {
            Some(p) => result.project(p.columns()),
            None => result,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.clauses.iter().map(Clause::to_string).collect();
        write!(f, "{}", parts.join(" and "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::table::{BATCH_COLUMN, ID_COLUMN};
    use serde_json::json;

    fn table() -> Table {
        let records: Vec<Value> = (1..=4)
            .map(|i| {
                json!({
                    "id": i,
                    "metadata": {
                        "batch": if i <= 2 { "230101" } else { "230102" },
                        "creation_datetime": {"datetime": format!("2023-01-0{} 12:00:00", i)},
                        "groups": {"set": if i % 2 == 0 { vec!["all-samples", "even"] } else { vec!["all-samples"] }}
                    },
                    "specs": {"case": "CR2032", "capacity": {"nominal": i as f64 * 0.5}}
                })
            })
            .collect();
        Table::from_records(&records)
    }

    fn ids(table: &Table) -> Vec<i64> {
        table
            .column(ID_COLUMN)
            .map(|c| match c {
                Cell::Int(i) => *i,
                other => panic!("unexpected id {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_empty_values_are_dropped() {
        let p = Predicate::from_json(&json!({
            "group": "",
            "from": null,
            "metadata.batch": [],
            "specs.case": "CR2032"
        }))
        .unwrap();
        assert!(p.group.is_none());
        assert!(p.from.is_none());
        assert_eq!(p.fields.len(), 1);
    }

    #[test]
    fn test_date_bounds_are_inclusive() {
        let p = Predicate::from_json(&json!({"from": "2023-01-02", "to": "2023-01-03"})).unwrap();
        assert_eq!(ids(&p.compile().evaluate(&table(), None)), vec![2, 3]);

        let exact = Predicate::from_json(&json!({"to": "2023-01-02 12:00:00"})).unwrap();
        assert_eq!(ids(&exact.compile().evaluate(&table(), None)), vec![1, 2]);
    }

    #[test]
    fn test_group_and_membership() {
        let p = Predicate::new().with_group("even");
        assert_eq!(ids(&p.compile().evaluate(&table(), None)), vec![2, 4]);

        let p = Predicate::from_json(&json!({"id": [1, 3, 99]})).unwrap();
        assert_eq!(ids(&p.compile().evaluate(&table(), None)), vec![1, 3]);
    }

    #[test]
    fn test_numeric_equality_coerces() {
        let p = Predicate::from_json(&json!({"specs.capacity.nominal": 1})).unwrap();
        assert_eq!(ids(&p.compile().evaluate(&table(), None)), vec![2]);
    }

    #[test]
    fn test_display_quotes_strings_only() {
        let q = Predicate::new()
            .with_equals(BATCH_COLUMN, "230101")
            .with_one_of(ID_COLUMN, vec![Cell::Int(1), Cell::Int(2)])
            .compile();
        assert_eq!(
            q.to_string(),
            "`id` in [1, 2] and `metadata.batch` == \"230101\""
        );
    }

    #[test]
    fn test_projection() {
        let p = Predicate::new().with_equals(BATCH_COLUMN, "230102");
        let result = p.compile().evaluate(&table(), Some(&Projection::from(ID_COLUMN)));
        assert_eq!(result.columns().len(), 1);
        assert_eq!(ids(&result), vec![3, 4]);
    }

    #[test]
    fn test_without_removes_related_conditions() {
        let p = Predicate::from_json(&json!({
            "from": "2023-01-01", "group": "even", "metadata.batch": "230101"
        }))
        .unwrap();
        assert!(p.without(GROUPS_COLUMN).group.is_none());
        assert!(p.without(DATETIME_COLUMN).from.is_none());
        assert!(!p.without(BATCH_COLUMN).fields.contains_key(BATCH_COLUMN));
        assert!(p.without(BATCH_COLUMN).group.is_some());
    }

    #[test]
    fn test_non_object_filter_rejected() {
        assert!(Predicate::from_json(&json!([1, 2])).is_err());
        assert!(Predicate::from_json(&Value::Null).unwrap().is_empty());
    }
}
