use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub type FieldMap = BTreeMap<String, FieldValue>;

const NUMBER_EPSILON: f64 = 1e-9;

/// A dynamically typed context value.
///
/// Values travel as plain JSON. Strings are never promoted to timestamps on
/// input; temporal comparisons parse them on demand through [`FieldValue::as_timestamp`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "JsonValue", into = "JsonValue")]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    StringList(Vec<String>),
    Timestamp(DateTime<Utc>),
    Object(FieldMap),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("field path is empty")]
    Empty,
    #[error("field path `{0}` contains an empty segment")]
    EmptySegment(String),
    #[error("cannot descend into `{segment}` of `{path}`: value is not an object")]
    NotAnObject { path: String, segment: String },
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "text",
            Self::StringList(_) => "list",
            Self::Timestamp(_) => "timestamp",
            Self::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Numbers, and text that parses as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::String(value) => value.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::String(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Timestamps, and text holding an RFC 3339 instant or a `YYYY-MM-DD` date.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(value) => Some(*value),
            Self::String(value) => parse_timestamp(value),
            _ => None,
        }
    }

    /// Equality used by `equals`, `not_equals` and `changes_to`.
    ///
    /// Text is compared exactly; numbers tolerate float noise and match numeric
    /// text; timestamps match text holding the same instant.
    pub fn loosely_equals(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::StringList(a), Self::StringList(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Bool(a), other) | (other, Self::Bool(a)) => other.as_bool() == Some(*a),
            (Self::Number(a), other) | (other, Self::Number(a)) => {
                other.as_number().is_some_and(|b| (a - b).abs() < NUMBER_EPSILON)
            }
            (Self::Timestamp(a), other) | (other, Self::Timestamp(a)) => {
                other.as_timestamp() == Some(*a)
            }
            _ => false,
        }
    }

    /// Numeric ordering where both sides are numeric, otherwise temporal ordering.
    pub fn partial_order(&self, other: &FieldValue) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a.partial_cmp(&b);
        }
        match (self.as_timestamp(), other.as_timestamp()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
            Self::StringList(values) => write!(f, "[{}]", values.join(", ")),
            Self::Timestamp(value) => f.write_str(&value.to_rfc3339()),
            Self::Object(map) => write!(f, "{{{} fields}}", map.len()),
        }
    }
}

impl From<JsonValue> for FieldValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(value) => Self::Bool(value),
            JsonValue::Number(number) => number.as_f64().map_or(Self::Null, Self::Number),
            JsonValue::String(value) => Self::String(value),
            JsonValue::Array(items) => Self::StringList(
                items
                    .into_iter()
                    .map(|item| match item {
                        JsonValue::String(value) => value,
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            JsonValue::Object(map) => {
                Self::Object(map.into_iter().map(|(key, value)| (key, Self::from(value))).collect())
            }
        }
    }
}

impl From<FieldValue> for JsonValue {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Null => JsonValue::Null,
            FieldValue::Bool(value) => JsonValue::Bool(value),
            FieldValue::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
                    JsonValue::from(value as i64)
                } else {
                    serde_json::Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
                }
            }
            FieldValue::String(value) => JsonValue::String(value),
            FieldValue::StringList(values) => {
                JsonValue::Array(values.into_iter().map(JsonValue::String).collect())
            }
            FieldValue::Timestamp(value) => JsonValue::String(value.to_rfc3339()),
            FieldValue::Object(map) => JsonValue::Object(
                map.into_iter().map(|(key, value)| (key, JsonValue::from(value))).collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        Self::StringList(values)
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, PathError> {
    if path.trim().is_empty() {
        return Err(PathError::Empty);
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(PathError::EmptySegment(path.to_owned()));
    }
    Ok(segments)
}

/// Looks up a dot-path (`customer.tier`) in a field map.
pub fn get_path<'a>(map: &'a FieldMap, path: &str) -> Option<&'a FieldValue> {
    let mut segments = path.split('.');
    let mut current = map.get(segments.next()?)?;
    for segment in segments {
        match current {
            FieldValue::Object(inner) => current = inner.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Writes a value at a dot-path, creating intermediate objects. Returns the
/// value previously stored there.
pub fn set_path(
    map: &mut FieldMap,
    path: &str,
    value: FieldValue,
) -> Result<Option<FieldValue>, PathError> {
    let segments = split_path(path)?;
    let (last, parents) = segments.split_last().ok_or(PathError::Empty)?;

    let mut current = map;
    for segment in parents {
        let entry = current
            .entry((*segment).to_owned())
            .or_insert_with(|| FieldValue::Object(FieldMap::new()));
        current = match entry {
            FieldValue::Object(inner) => inner,
            _ => {
                return Err(PathError::NotAnObject {
                    path: path.to_owned(),
                    segment: (*segment).to_owned(),
                })
            }
        };
    }

    Ok(current.insert((*last).to_owned(), value))
}
