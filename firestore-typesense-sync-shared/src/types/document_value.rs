//! Source document value tree.
//!
//! This module defines the platform-independent representation of the fields
//! stored in a source document, including the non-JSON value kinds the source
//! database supports (timestamps, geopoints, references and bytes).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Number, Value};

/// The fields of a document or nested map, keyed by field name.
pub type DocumentData = BTreeMap<String, DocumentValue>;

/// A single value stored in a source document.
///
/// Serializes to JSON using the following forms for non-native kinds:
///
/// - `Timestamp` as `{"_seconds": s, "_nanoseconds": n}`
/// - `GeoPoint` as `{"_latitude": lat, "_longitude": lng}`
/// - `Reference` as `{"_reference": true, "path": "coll/doc"}`
/// - `Bytes` as a base64 string
///
/// Deserializing JSON always yields plain maps for those forms. Shape
/// detection during projection recognises them again.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DocumentValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp {
        seconds: i64,
        nanos: i32,
    },
    GeoPoint {
        latitude: f64,
        longitude: f64,
    },
    /// Path of the referenced document, relative to the database root.
    Reference(String),
    Bytes(Vec<u8>),
    Array(Vec<DocumentValue>),
    Map(DocumentData),
}

impl DocumentValue {
    /// Returns the string slice if this is a `String` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an `Integer` value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the numeric value of `Integer` and `Double` values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&DocumentData> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[DocumentValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert this value into its JSON form.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::Number((*i).into()),
            Self::Double(d) => Number::from_f64(*d).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.clone()),
            Self::Timestamp { seconds, nanos } => json!({
                "_seconds": seconds,
                "_nanoseconds": nanos,
            }),
            Self::GeoPoint {
                latitude,
                longitude,
            } => json!({
                "_latitude": latitude,
                "_longitude": longitude,
            }),
            Self::Reference(path) => json!({
                "_reference": true,
                "path": path,
            }),
            Self::Bytes(bytes) => Value::String(BASE64.encode(bytes)),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(data_to_json(map)),
        }
    }

    /// Rank of the value kind, used to order values of different kinds.
    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Integer(_) | Self::Double(_) => 2,
            Self::Timestamp { .. } => 3,
            Self::String(_) => 4,
            Self::Bytes(_) => 5,
            Self::Reference(_) => 6,
            Self::GeoPoint { .. } => 7,
            Self::Array(_) => 8,
            Self::Map(_) => 9,
        }
    }

    /// Total order used for query ordering and cursors.
    ///
    /// Values of different kinds order by kind; numbers compare numerically
    /// regardless of integer/double representation.
    pub fn compare(&self, other: &Self) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (a @ (Self::Integer(_) | Self::Double(_)), b) => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (
                Self::Timestamp {
                    seconds: s1,
                    nanos: n1,
                },
                Self::Timestamp {
                    seconds: s2,
                    nanos: n2,
                },
            ) => (s1, n1).cmp(&(s2, n2)),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (Self::Reference(a), Self::Reference(b)) => a.cmp(b),
            (
                Self::GeoPoint {
                    latitude: la1,
                    longitude: lo1,
                },
                Self::GeoPoint {
                    latitude: la2,
                    longitude: lo2,
                },
            ) => la1.total_cmp(la2).then(lo1.total_cmp(lo2)),
            (Self::Array(a), Self::Array(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.compare(y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Self::Map(a), Self::Map(b)) => a
                .iter()
                .zip(b.iter())
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| va.compare(vb)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            _ => Ordering::Equal,
        }
    }
}

/// Convert document fields into a JSON object.
pub fn data_to_json(data: &DocumentData) -> Map<String, Value> {
    data.iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect()
}

/// Convert a JSON value into document fields.
///
/// Non-object values yield empty data.
pub fn data_from_json(value: Value) -> DocumentData {
    match DocumentValue::from(value) {
        DocumentValue::Map(map) => map,
        _ => DocumentData::new(),
    }
}

impl From<Value> for DocumentValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for DocumentValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DocumentValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for DocumentValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for DocumentValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for DocumentValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for DocumentValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DocumentData> for DocumentValue {
    fn from(value: DocumentData) -> Self {
        Self::Map(value)
    }
}

impl<T: Into<DocumentValue>> From<Vec<T>> for DocumentValue {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}

impl Serialize for DocumentValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DocumentValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}
