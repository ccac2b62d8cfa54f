//! Raw API record → write-set mapping.
//!
//! A record maps completely or not at all: every field is read and
//! converted before the caller touches the store.

pub mod activity;
pub mod course;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::{Map, Value};

use crate::timestamp;

/// Why a record could not be mapped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// Record (or nested item) is not a JSON object
    NotAnObject(String),
    /// Required key absent, or a natural key present but null
    MissingField(String),
    WrongType {
        field: String,
        expected: &'static str,
    },
    InvalidTimestamp {
        field: String,
        value: String,
    },
    InvalidDate {
        field: String,
        value: String,
    },
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject(what) => write!(f, "{what} is not a JSON object"),
            Self::MissingField(field) => write!(f, "missing required field `{field}`"),
            Self::WrongType { field, expected } => write!(f, "field `{field}`: expected {expected}"),
            Self::InvalidTimestamp { field, value } => {
                write!(f, "field `{field}`: unparseable timestamp {value:?}")
            }
            Self::InvalidDate { field, value } => write!(f, "field `{field}`: unparseable date {value:?}"),
        }
    }
}

impl std::error::Error for MapError {}

/// Whether a key must be present in the record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Need {
    /// Absent key is an error; explicit null maps to `None`
    Required,
    /// Absent key and null both map to `None`
    Optional,
}

/// Typed view over one JSON object; field names in errors carry the
/// dotted path from the record root.
pub(crate) struct RawRecord<'a> {
    map: &'a Map<String, Value>,
    prefix: String,
}

impl<'a> RawRecord<'a> {
    pub fn new(value: &'a Value, what: &str) -> Result<Self, MapError> {
        value
            .as_object()
            .map(|map| Self {
                map,
                prefix: String::new(),
            })
            .ok_or_else(|| MapError::NotAnObject(what.to_string()))
    }

    fn path(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn wrong(&self, key: &str, expected: &'static str) -> MapError {
        MapError::WrongType {
            field: self.path(key),
            expected,
        }
    }

    /// Non-null value under `key`
    fn lookup(&self, key: &str, need: Need) -> Result<Option<&'a Value>, MapError> {
        match self.map.get(key) {
            None if need == Need::Required => Err(MapError::MissingField(self.path(key))),
            None | Some(Value::Null) => Ok(None),
            Some(v) => Ok(Some(v)),
        }
    }

    /// Natural key: present, non-null integer
    pub fn id(&self, key: &str) -> Result<i64, MapError> {
        self.int(key, Need::Required)?
            .ok_or_else(|| MapError::MissingField(self.path(key)))
    }

    /// Natural key: present, non-null string
    pub fn key_text(&self, key: &str) -> Result<String, MapError> {
        self.text(key, Need::Required)?
            .ok_or_else(|| MapError::MissingField(self.path(key)))
    }

    pub fn text(&self, key: &str, need: Need) -> Result<Option<String>, MapError> {
        self.lookup(key, need)?
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| self.wrong(key, "string")))
            .transpose()
    }

    /// String or number, kept as text
    pub fn loose_text(&self, key: &str, need: Need) -> Result<Option<String>, MapError> {
        self.lookup(key, need)?
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(self.wrong(key, "string or number")),
            })
            .transpose()
    }

    pub fn int(&self, key: &str, need: Need) -> Result<Option<i64>, MapError> {
        self.lookup(key, need)?
            .map(|v| v.as_i64().ok_or_else(|| self.wrong(key, "integer")))
            .transpose()
    }

    pub fn float(&self, key: &str, need: Need) -> Result<Option<f64>, MapError> {
        self.lookup(key, need)?
            .map(|v| v.as_f64().ok_or_else(|| self.wrong(key, "number")))
            .transpose()
    }

    pub fn flag(&self, key: &str, need: Need) -> Result<Option<bool>, MapError> {
        self.lookup(key, need)?
            .map(|v| v.as_bool().ok_or_else(|| self.wrong(key, "boolean")))
            .transpose()
    }

    /// Offset-aware timestamp; empty string maps to `None`
    pub fn timestamp(&self, key: &str, need: Need) -> Result<Option<DateTime<FixedOffset>>, MapError> {
        let raw = self.text(key, need)?;
        timestamp::normalize(raw.as_deref()).map_err(|_| MapError::InvalidTimestamp {
            field: self.path(key),
            value: raw.unwrap_or_default(),
        })
    }

    /// Calendar date; a full timestamp is accepted and truncated to its date
    pub fn date(&self, key: &str, need: Need) -> Result<Option<NaiveDate>, MapError> {
        let Some(raw) = self.text(key, need)?.filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };
        if let Ok(d) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            return Ok(Some(d));
        }
        match timestamp::normalize(Some(&raw)) {
            Ok(Some(dt)) => Ok(Some(dt.date_naive())),
            _ => Err(MapError::InvalidDate {
                field: self.path(key),
                value: raw,
            }),
        }
    }

    /// Nested object
    pub fn object(&self, key: &str, need: Need) -> Result<Option<RawRecord<'a>>, MapError> {
        self.lookup(key, need)?
            .map(|v| {
                v.as_object()
                    .map(|map| RawRecord {
                        map,
                        prefix: format!("{}.", self.path(key)),
                    })
                    .ok_or_else(|| self.wrong(key, "object"))
            })
            .transpose()
    }

    /// Nested object that must be present and non-null
    pub fn required_object(&self, key: &str) -> Result<RawRecord<'a>, MapError> {
        self.object(key, Need::Required)?
            .ok_or_else(|| MapError::MissingField(self.path(key)))
    }

    /// List under `key`; absent or null is empty
    pub fn list(&self, key: &str) -> Result<&'a [Value], MapError> {
        match self.lookup(key, Need::Optional)? {
            None => Ok(&[]),
            Some(v) => v
                .as_array()
                .map(Vec::as_slice)
                .ok_or_else(|| self.wrong(key, "list")),
        }
    }

    /// Whether `key` holds a JSON array
    pub fn has_list(&self, key: &str) -> bool {
        self.map.get(key).is_some_and(Value::is_array)
    }

    /// Items of a list, each viewed as an object
    pub fn object_list(&self, key: &str) -> Result<Vec<RawRecord<'a>>, MapError> {
        self.list(key)?
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_object()
                    .map(|map| RawRecord {
                        map,
                        prefix: format!("{}[{i}].", self.path(key)),
                    })
                    .ok_or_else(|| MapError::NotAnObject(format!("{}[{i}]", self.path(key))))
            })
            .collect()
    }

    /// Non-null strings of a list; nulls are dropped
    pub fn string_list(&self, key: &str) -> Result<Vec<String>, MapError> {
        self.list(key)?
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| self.wrong(key, "list of strings")))
            .collect()
    }

    /// All entries of the object, in key order
    pub fn entries(&self) -> impl Iterator<Item = (&'a String, &'a Value)> {
        self.map.iter()
    }
}

/// Short description of a raw record for log lines, best effort
pub fn describe(record: &Value) -> String {
    let get = |k: &str| record.get(k).filter(|v| !v.is_null()).map(Value::to_string);
    match (get("id"), get("user_id"), get("course_id")) {
        (Some(id), _, _) => format!("course {id}"),
        (None, Some(u), Some(c)) => format!("user {u} / course {c}"),
        _ => "record without key".to_string(),
    }
}
