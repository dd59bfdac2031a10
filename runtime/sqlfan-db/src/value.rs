//! Cell values and their semantic kinds.
//!
//! [`classify`] is the single place a [`Kind`] is derived from a [`Value`];
//! the loader consumes that kind exhaustively when it picks a binder. Dates
//! and blobs do not survive a JSON hop, so rows bound for a remote endpoint
//! are enriched into [`TypedValue`]s first and rehydrated on arrival.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Text form used for dates inside SQL literals and on the wire.
pub const DATETIME_TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single cell as seen by the query and ingestion layers.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    Date(NaiveDateTime),
    Blob(Vec<u8>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

/// Semantic kind assigned by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Null,
    Boolean,
    Integer,
    Double,
    String,
    Date,
    Blob,
    Array,
    Object,
    Unknown,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::String => "string",
            Self::Date => "date",
            Self::Blob => "blob",
            Self::Array => "array",
            Self::Object => "object",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assigns a value its semantic kind.
///
/// Non-finite doubles have no portable SQL representation and classify as
/// [`Kind::Unknown`].
pub fn classify(value: &Value) -> Kind {
    match value {
        Value::Null => Kind::Null,
        Value::Bool(_) => Kind::Boolean,
        Value::Int(_) => Kind::Integer,
        Value::Double(v) if v.is_finite() => Kind::Double,
        Value::Double(_) => Kind::Unknown,
        Value::Text(_) => Kind::String,
        Value::Date(_) => Kind::Date,
        Value::Blob(_) => Kind::Blob,
        Value::Array(_) => Kind::Array,
        Value::Object(_) => Kind::Object,
    }
}

/// Parses the date/time spellings accepted in filters and typed values.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Int(v) => Some(*v != 0),
            Self::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(v) => Some(i64::from(*v)),
            Self::Double(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Self::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// The value as a date, parsing text when necessary.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Date(date) => Some(*date),
            Self::Text(text) => parse_datetime(text),
            _ => None,
        }
    }

    /// Plain text rendering used when a value is bound or coerced as a string.
    ///
    /// Arrays and objects render as JSON text, blobs as base64.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Double(v) => v.to_string(),
            Self::Text(text) => text.clone(),
            Self::Date(date) => date.format(DATETIME_TEXT_FORMAT).to_string(),
            Self::Blob(bytes) => BASE64.encode(bytes),
            Self::Array(_) | Self::Object(_) => self.to_json().to_string(),
        }
    }

    /// Lossy JSON form: dates become text and blobs become base64.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Double(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(text) => serde_json::Value::String(text.clone()),
            Self::Date(date) => {
                serde_json::Value::String(date.format(DATETIME_TEXT_FORMAT).to_string())
            }
            Self::Blob(bytes) => serde_json::Value::String(BASE64.encode(bytes)),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(v) => Self::Bool(v),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(v) => Self::Int(v),
                None => Self::Double(number.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(text) => Self::Text(text),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Date(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

/// A pre-classified cell that can cross the remote boundary intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypedValue {
    pub kind: Kind,
    pub value: serde_json::Value,
}

impl TypedValue {
    /// Metadata enrichment: classify locally, then flatten to JSON.
    pub fn enrich(value: &Value) -> Self {
        Self {
            kind: classify(value),
            value: value.to_json(),
        }
    }

    pub fn enrich_row(row: &[Value]) -> Vec<Self> {
        row.iter().map(Self::enrich).collect()
    }

    /// Restores the richest value the kind allows.
    ///
    /// A date or blob whose payload no longer parses comes back as text; the
    /// kind is kept by the caller so the binder can still fall back.
    pub fn rehydrate(&self) -> Value {
        match (self.kind, &self.value) {
            (Kind::Null, _) | (_, serde_json::Value::Null) => Value::Null,
            (Kind::Date, serde_json::Value::String(text)) => parse_datetime(text)
                .map(Value::Date)
                .unwrap_or_else(|| Value::Text(text.clone())),
            (Kind::Blob, serde_json::Value::String(text)) => BASE64
                .decode(text)
                .map(Value::Blob)
                .unwrap_or_else(|_| Value::Text(text.clone())),
            (Kind::Unknown, serde_json::Value::String(text)) => Value::Text(text.clone()),
            (_, json) => Value::from(json.clone()),
        }
    }
}

/// A cell arriving over the wire: either pre-classified or raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Typed(TypedValue),
    Raw(Value),
}
