//! Flat tabular view of inventory records
//!
//! Nested records are flattened into dotted column names
//! (`specs.capacity.nominal`). Tagged values become typed cells, so
//! `metadata.creation_datetime` is a real timestamp and `metadata.groups`
//! a set.

use crate::storage::encoding::TaggedValue;
use aurora_common::time::format_datetime;
use chrono::NaiveDateTime;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Well-known sample columns
pub const ID_COLUMN: &str = "id";
pub const DATETIME_COLUMN: &str = "metadata.creation_datetime";
pub const GROUPS_COLUMN: &str = "metadata.groups";
pub const BATCH_COLUMN: &str = "metadata.batch";
pub const SUBBATCH_COLUMN: &str = "metadata.subbatch";

/// One typed table value
///
/// Ordering and equality treat `Int` and `Float` as one numeric domain, so
/// `Int(1) == Float(1.0)`.
#[derive(Debug, Clone)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    DateTime(NaiveDateTime),
    Set(BTreeSet<String>),
    Bytes(Vec<u8>),
}

impl Cell {
    /// Cell for a scalar JSON value; objects and arrays are kept as JSON text
    pub fn from_json(value: &Value) -> Self {
        if let Some(tagged) = TaggedValue::from_value(value) {
            return match tagged {
                TaggedValue::Set(items) => Cell::Set(items.iter().map(json_text).collect()),
                TaggedValue::DateTime(dt) => Cell::DateTime(dt),
                TaggedValue::Blob(bytes) => Cell::Bytes(bytes),
            };
        }
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Cell::Int(i),
                None => Cell::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Cell::Str(s.clone()),
            other => Cell::Str(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&NaiveDateTime> {
        match self {
            Cell::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Cell::Set(s) => Some(s),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(x) => Some(*x),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            Cell::Bool(_) => 1,
            Cell::Int(_) | Cell::Float(_) => 2,
            Cell::Str(_) => 3,
            Cell::DateTime(_) => 4,
            Cell::Set(_) => 5,
            Cell::Bytes(_) => 6,
        }
    }

    /// Render for a query string: strings and timestamps quoted, numbers bare
    pub fn to_literal(&self) -> String {
        match self {
            Cell::Str(s) => format!("{:?}", s),
            Cell::DateTime(dt) => format!("'{}'", format_datetime(dt)),
            other => other.to_string(),
        }
    }
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a.total_cmp(&b);
        }
        match (self, other) {
            (Cell::Null, Cell::Null) => Ordering::Equal,
            (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
            (Cell::Str(a), Cell::Str(b)) => a.cmp(b),
            (Cell::DateTime(a), Cell::DateTime(b)) => a.cmp(b),
            (Cell::Set(a), Cell::Set(b)) => a.cmp(b),
            (Cell::Bytes(a), Cell::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "null"),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(x) => write!(f, "{}", x),
            Cell::Str(s) => write!(f, "{}", s),
            Cell::DateTime(dt) => write!(f, "{}", format_datetime(dt)),
            Cell::Set(items) => {
                let joined: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", joined.join(", "))
            }
            Cell::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Str(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Str(s)
    }
}

impl From<i64> for Cell {
    fn from(i: i64) -> Self {
        Cell::Int(i)
    }
}

impl From<u32> for Cell {
    fn from(i: u32) -> Self {
        Cell::Int(i64::from(i))
    }
}

impl From<f64> for Cell {
    fn from(x: f64) -> Self {
        Cell::Float(x)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

/// One flattened record; absent columns read as `Null`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: BTreeMap<String, Cell>,
}

static NULL: Cell = Cell::Null;

impl Row {
    /// Flatten a record into dotted columns
    pub fn flatten(record: &Value) -> Self {
        let mut row = Row::default();
        flatten_into(&mut row.cells, "", record);
        row
    }

    pub fn get(&self, column: &str) -> &Cell {
        self.cells.get(column).unwrap_or(&NULL)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    /// Keep only `columns`, in any order
    pub fn project(&self, columns: &[String]) -> Row {
        Row {
            cells: columns
                .iter()
                .map(|c| (c.clone(), self.get(c).clone()))
                .collect(),
        }
    }
}

fn flatten_into(cells: &mut BTreeMap<String, Cell>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) if TaggedValue::from_value(value).is_none() && !map.is_empty() => {
            for (key, inner) in map {
                let column = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(cells, &column, inner);
            }
        }
        _ => {
            cells.insert(prefix.to_string(), Cell::from_json(value));
        }
    }
}

/// Ordered rows sharing a column set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: BTreeSet<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Value>) -> Self {
        Self::from_rows(records.into_iter().map(Row::flatten).collect())
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .iter()
            .flat_map(|r| r.columns().map(str::to_string))
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Values of one column, in row order
    pub fn column(&self, column: &str) -> impl Iterator<Item = &Cell> + '_ {
        let column = column.to_string();
        self.rows.iter().map(move |r| r.get(&column))
    }

    /// Rows for which `keep` holds
    pub fn filter(&self, keep: impl Fn(&Row) -> bool) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Restrict to `columns`
    pub fn project(&self, columns: &[String]) -> Table {
        Table {
            columns: columns.iter().cloned().collect(),
            rows: self.rows.iter().map(|r| r.project(columns)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "id": 7,
            "metadata": {
                "batch": "230101",
                "creation_datetime": {"datetime": "2023-01-01 10:00:00"},
                "groups": {"set": ["all-samples", "trial1"]}
            },
            "specs": {"capacity": {"nominal": 1.5}},
            "notes": [1, 2]
        })
    }

    #[test]
    fn test_flatten_uses_dotted_typed_columns() {
        let row = Row::flatten(&record());
        assert_eq!(row.get(ID_COLUMN), &Cell::Int(7));
        assert_eq!(row.get(BATCH_COLUMN), &Cell::from("230101"));
        assert!(row.get(DATETIME_COLUMN).as_datetime().is_some());
        assert!(row.get(GROUPS_COLUMN).as_set().unwrap().contains("trial1"));
        assert_eq!(row.get("specs.capacity.nominal"), &Cell::Float(1.5));
        assert_eq!(row.get("notes"), &Cell::from("[1,2]"));
        assert!(row.get("missing.column").is_null());
    }

    #[test]
    fn test_numeric_cells_compare_across_int_and_float() {
        assert_eq!(Cell::Int(1), Cell::Float(1.0));
        assert!(Cell::Int(1) < Cell::Float(1.5));
        assert_ne!(Cell::Int(1), Cell::from("1"));
        assert!(Cell::Null < Cell::Bool(false));
    }

    #[test]
    fn test_literals() {
        assert_eq!(Cell::from("CR2032").to_literal(), "\"CR2032\"");
        assert_eq!(Cell::Int(3).to_literal(), "3");
        assert_eq!(Cell::Float(0.5).to_literal(), "0.5");
    }

    #[test]
    fn test_table_filter_and_project() {
        let a = record();
        let mut b = record();
        b["id"] = json!(8);
        b["metadata"]["batch"] = json!("230102");
        let table = Table::from_records([&a, &b]);
        assert_eq!(table.len(), 2);
        assert!(table.has_column("specs.capacity.nominal"));

        let filtered = table.filter(|r| r.get(BATCH_COLUMN) == &Cell::from("230102"));
        assert_eq!(filtered.len(), 1);

        let projected = filtered.project(&[ID_COLUMN.to_string()]);
        assert_eq!(projected.columns().len(), 1);
        assert_eq!(projected.rows()[0].get(ID_COLUMN), &Cell::Int(8));
    }
}
