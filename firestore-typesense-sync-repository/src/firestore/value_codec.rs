//! Conversion between `DocumentValue` and the Firestore REST value encoding.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use firestore_typesense_sync_shared::{DocumentData, DocumentValue};
use serde_json::{json, Map, Value};

use crate::errors::StoreError;

/// Encodes and decodes typed Firestore values.
///
/// References travel as full resource names; the codec strips and restores
/// the database documents root so that `DocumentValue::Reference` holds a
/// path relative to the root.
#[derive(Debug, Clone)]
pub struct ValueCodec {
    documents_root: String,
}

impl ValueCodec {
    pub fn new(documents_root: impl Into<String>) -> Self {
        Self {
            documents_root: documents_root.into(),
        }
    }

    /// Full resource name of the document at `path`.
    pub fn document_name(&self, path: &str) -> String {
        format!("{}/{}", self.documents_root, path.trim_matches('/'))
    }

    /// Path relative to the documents root for a full resource name.
    pub fn relative_path<'a>(&self, name: &'a str) -> &'a str {
        name.strip_prefix(self.documents_root.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(name)
    }

    pub fn encode(&self, value: &DocumentValue) -> Value {
        match value {
            DocumentValue::Null => json!({"nullValue": null}),
            DocumentValue::Boolean(b) => json!({"booleanValue": b}),
            DocumentValue::Integer(i) => json!({"integerValue": i.to_string()}),
            DocumentValue::Double(d) => json!({"doubleValue": d}),
            DocumentValue::String(s) => json!({"stringValue": s}),
            DocumentValue::Timestamp { seconds, nanos } => {
                let text = DateTime::<Utc>::from_timestamp(*seconds, (*nanos).max(0) as u32)
                    .unwrap_or_default()
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true);
                json!({"timestampValue": text})
            }
            DocumentValue::GeoPoint {
                latitude,
                longitude,
            } => json!({"geoPointValue": {"latitude": latitude, "longitude": longitude}}),
            DocumentValue::Reference(path) => json!({"referenceValue": self.document_name(path)}),
            DocumentValue::Bytes(bytes) => json!({"bytesValue": BASE64.encode(bytes)}),
            DocumentValue::Array(items) => json!({
                "arrayValue": {"values": items.iter().map(|v| self.encode(v)).collect::<Vec<_>>()}
            }),
            DocumentValue::Map(fields) => json!({"mapValue": {"fields": self.encode_fields(fields)}}),
        }
    }

    pub fn encode_fields(&self, data: &DocumentData) -> Value {
        Value::Object(
            data.iter()
                .map(|(key, value)| (key.clone(), self.encode(value)))
                .collect::<Map<_, _>>(),
        )
    }

    pub fn decode(&self, value: &Value) -> Result<DocumentValue, StoreError> {
        let object = value
            .as_object()
            .ok_or_else(|| StoreError::codec(format!("Expected a typed value, got {}", value)))?;
        let (kind, inner) = object
            .iter()
            .next()
            .ok_or_else(|| StoreError::codec("Empty typed value"))?;

        match kind.as_str() {
            "nullValue" => Ok(DocumentValue::Null),
            "booleanValue" => inner
                .as_bool()
                .map(DocumentValue::Boolean)
                .ok_or_else(|| StoreError::codec("booleanValue must be a bool")),
            "integerValue" => match inner {
                Value::String(s) => s
                    .parse()
                    .map(DocumentValue::Integer)
                    .map_err(|e| StoreError::codec(format!("integerValue {}: {}", s, e))),
                other => other
                    .as_i64()
                    .map(DocumentValue::Integer)
                    .ok_or_else(|| StoreError::codec("integerValue must be an integer")),
            },
            "doubleValue" => match inner {
                Value::String(s) => s
                    .parse()
                    .map(DocumentValue::Double)
                    .map_err(|e| StoreError::codec(format!("doubleValue {}: {}", s, e))),
                other => other
                    .as_f64()
                    .map(DocumentValue::Double)
                    .ok_or_else(|| StoreError::codec("doubleValue must be a number")),
            },
            "stringValue" => inner
                .as_str()
                .map(|s| DocumentValue::String(s.to_string()))
                .ok_or_else(|| StoreError::codec("stringValue must be a string")),
            "timestampValue" => {
                let text = inner
                    .as_str()
                    .ok_or_else(|| StoreError::codec("timestampValue must be a string"))?;
                let parsed = DateTime::parse_from_rfc3339(text)
                    .map_err(|e| StoreError::codec(format!("timestampValue {}: {}", text, e)))?;
                Ok(DocumentValue::Timestamp {
                    seconds: parsed.timestamp(),
                    nanos: parsed.timestamp_subsec_nanos() as i32,
                })
            }
            "geoPointValue" => Ok(DocumentValue::GeoPoint {
                latitude: inner.get("latitude").and_then(Value::as_f64).unwrap_or(0.0),
                longitude: inner.get("longitude").and_then(Value::as_f64).unwrap_or(0.0),
            }),
            "referenceValue" => inner
                .as_str()
                .map(|name| DocumentValue::Reference(self.relative_path(name).to_string()))
                .ok_or_else(|| StoreError::codec("referenceValue must be a string")),
            "bytesValue" => {
                let text = inner
                    .as_str()
                    .ok_or_else(|| StoreError::codec("bytesValue must be a string"))?;
                BASE64
                    .decode(text)
                    .map(DocumentValue::Bytes)
                    .map_err(|e| StoreError::codec(format!("bytesValue: {}", e)))
            }
            "arrayValue" => {
                let values = match inner.get("values") {
                    Some(Value::Array(values)) => values
                        .iter()
                        .map(|v| self.decode(v))
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => Vec::new(),
                };
                Ok(DocumentValue::Array(values))
            }
            "mapValue" => Ok(DocumentValue::Map(self.decode_fields(inner.get("fields"))?)),
            other => Err(StoreError::codec(format!("Unknown value kind {}", other))),
        }
    }

    /// Decode a `fields` object. A missing object decodes to empty data.
    pub fn decode_fields(&self, fields: Option<&Value>) -> Result<DocumentData, StoreError> {
        match fields {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(key, value)| Ok((key.clone(), self.decode(value)?)))
                .collect(),
            Some(Value::Null) | None => Ok(DocumentData::new()),
            Some(other) => Err(StoreError::codec(format!(
                "fields must be an object, got {}",
                other
            ))),
        }
    }
}
