//! Tagged encoding of non-JSON scalars in inventory documents
//!
//! Three value kinds have no native JSON form and travel as single-key
//! objects:
//!
//! | kind     | document form                               |
//! |----------|---------------------------------------------|
//! | set      | `{"set": [...]}`                            |
//! | datetime | `{"datetime": "YYYY-MM-DD HH:MM:SS"}`       |
//! | blob     | `{"blob": "<base64>"}`                      |
//!
//! Typed records use the `tagged_set` / `tagged_datetime` serde adapters;
//! untyped consumers (the flat table cache) use [`TaggedValue`].

use aurora_common::time::{format_datetime, parse_datetime};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

pub const SET_TAG: &str = "set";
pub const DATETIME_TAG: &str = "datetime";
pub const BLOB_TAG: &str = "blob";

/// A decoded tagged value
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedValue {
    Set(Vec<Value>),
    DateTime(NaiveDateTime),
    Blob(Vec<u8>),
}

impl TaggedValue {
    /// Recognise a tagged object; anything else yields `None`
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.len() != 1 {
            return None;
        }
        let (tag, inner) = map.iter().next()?;
        match tag.as_str() {
            SET_TAG => inner.as_array().map(|items| TaggedValue::Set(items.clone())),
            DATETIME_TAG => inner
                .as_str()
                .and_then(parse_datetime)
                .map(TaggedValue::DateTime),
            BLOB_TAG => inner
                .as_str()
                .and_then(|s| STANDARD.decode(s).ok())
                .map(TaggedValue::Blob),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            TaggedValue::Set(items) => json!({ SET_TAG: items }),
            TaggedValue::DateTime(dt) => json!({ DATETIME_TAG: format_datetime(dt) }),
            TaggedValue::Blob(bytes) => encode_blob(bytes),
        }
    }
}

/// Wrap opaque bytes as a `{"blob": ...}` object
pub fn encode_blob(bytes: &[u8]) -> Value {
    let mut map = Map::new();
    map.insert(BLOB_TAG.to_string(), Value::String(STANDARD.encode(bytes)));
    Value::Object(map)
}

/// Unwrap a `{"blob": ...}` object
pub fn decode_blob(value: &Value) -> Option<Vec<u8>> {
    match TaggedValue::from_value(value)? {
        TaggedValue::Blob(bytes) => Some(bytes),
        _ => None,
    }
}

/// Serde adapter: `BTreeSet<String>` as `{"set": [...]}`
///
/// A bare JSON array is accepted on input.
pub mod tagged_set {
    use super::*;
    use std::collections::BTreeSet;

    #[derive(Serialize)]
    struct TaggedRef<'a> {
        set: &'a BTreeSet<String>,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Tagged { set: Vec<String> },
        Plain(Vec<String>),
    }

    pub fn serialize<S: Serializer>(value: &BTreeSet<String>, serializer: S) -> Result<S::Ok, S::Error> {
        TaggedRef { set: value }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<String>, D::Error> {
        let items = match Repr::deserialize(deserializer)? {
            Repr::Tagged { set } => set,
            Repr::Plain(items) => items,
        };
        Ok(items.into_iter().collect())
    }
}

/// Serde adapter: `NaiveDateTime` as `{"datetime": "YYYY-MM-DD HH:MM:SS"}`
///
/// A bare string in the same format is accepted on input.
pub mod tagged_datetime {
    use super::*;
    use serde::de::Error as _;

    #[derive(Serialize)]
    struct TaggedOut {
        datetime: String,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Tagged { datetime: String },
        Plain(String),
    }

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        TaggedOut {
            datetime: format_datetime(value),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = match Repr::deserialize(deserializer)? {
            Repr::Tagged { datetime } => datetime,
            Repr::Plain(s) => s,
        };
        parse_datetime(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime {:?}, expected YYYY-MM-DD HH:MM:SS", raw)))
    }
}
