//! Conversion of source values into index-safe JSON.
//!
//! Typed timestamps, geopoints and references map directly. Plain maps are
//! checked against an ordered list of shape rules first, so values that went
//! through a JSON round trip (the transformer, the buffer) map the same way.

use firestore_typesense_sync_shared::{DocumentData, DocumentValue};
use serde_json::{json, Map, Value};

const SECONDS_KEYS: &[&str] = &["seconds", "_seconds"];
const NANOS_KEYS: &[&str] = &["nanoseconds", "_nanoseconds", "nanos"];
const LATITUDE_KEYS: &[&str] = &["latitude", "_latitude", "lat"];
const LONGITUDE_KEYS: &[&str] = &["longitude", "_longitude", "lng"];
const GEOHASH_KEY: &str = "geohash";
const REFERENCE_MARKER: &str = "_reference";
const REFERENCE_PATH: &str = "path";

/// A recognised map shape and its index representation.
struct ShapeRule {
    name: &'static str,
    matches: fn(&DocumentData) -> bool,
    map: fn(&DocumentData) -> Value,
}

/// Checked in order; the first match wins.
const SHAPE_RULES: &[ShapeRule] = &[
    ShapeRule {
        name: "timestamp",
        matches: is_timestamp,
        map: map_timestamp,
    },
    ShapeRule {
        name: "geopoint",
        matches: is_geopoint,
        map: map_geopoint,
    },
    ShapeRule {
        name: "reference",
        matches: is_reference,
        map: map_reference,
    },
];

/// Map a single value, recursing into arrays and maps.
///
/// # Example
///
/// ```
/// use firestore_typesense_sync::projector::map_value;
/// use firestore_typesense_sync_shared::DocumentValue;
/// use serde_json::json;
///
/// let point = DocumentValue::GeoPoint { latitude: 48.85, longitude: 2.35 };
/// assert_eq!(map_value(&point), json!([48.85, 2.35]));
/// ```
pub fn map_value(value: &DocumentValue) -> Value {
    match value {
        DocumentValue::Timestamp { seconds, nanos } => {
            json!(epoch_seconds(*seconds, i64::from(*nanos)))
        }
        DocumentValue::GeoPoint {
            latitude,
            longitude,
        } => json!([latitude, longitude]),
        DocumentValue::Reference(path) => json!({ REFERENCE_PATH: path }),
        DocumentValue::Array(items) => Value::Array(items.iter().map(map_value).collect()),
        DocumentValue::Map(map) => match shape_of(map) {
            Some(rule) => (rule.map)(map),
            None => Value::Object(map_fields(map)),
        },
        scalar => scalar.to_json(),
    }
}

/// Map every field of a document.
pub fn map_fields(data: &DocumentData) -> Map<String, Value> {
    data.iter()
        .map(|(key, value)| (key.clone(), map_value(value)))
        .collect()
}

/// Name of the shape a map is recognised as, if any.
pub fn shape_name(map: &DocumentData) -> Option<&'static str> {
    shape_of(map).map(|rule| rule.name)
}

fn shape_of(map: &DocumentData) -> Option<&'static ShapeRule> {
    SHAPE_RULES.iter().find(|rule| (rule.matches)(map))
}

fn number(map: &DocumentData, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| map.get(*key).and_then(DocumentValue::as_f64))
}

fn integer(map: &DocumentData, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| map.get(*key).and_then(DocumentValue::as_i64))
}

/// floor(epoch millis / 1000)
fn epoch_seconds(seconds: i64, nanos: i64) -> i64 {
    seconds
        .saturating_mul(1000)
        .saturating_add(nanos / 1_000_000)
        .div_euclid(1000)
}

fn epoch_seconds_f64(seconds: f64, nanos: f64) -> i64 {
    let millis = (seconds * 1000.0 + nanos / 1_000_000.0).floor();
    (millis / 1000.0).floor() as i64
}

fn is_timestamp(map: &DocumentData) -> bool {
    number(map, SECONDS_KEYS).is_some() && number(map, NANOS_KEYS).is_some()
}

fn map_timestamp(map: &DocumentData) -> Value {
    if let (Some(seconds), Some(nanos)) = (integer(map, SECONDS_KEYS), integer(map, NANOS_KEYS)) {
        return json!(epoch_seconds(seconds, nanos));
    }
    let seconds = number(map, SECONDS_KEYS).unwrap_or_default();
    let nanos = number(map, NANOS_KEYS).unwrap_or_default();
    json!(epoch_seconds_f64(seconds, nanos))
}

fn is_geopoint(map: &DocumentData) -> bool {
    let has_coordinates =
        number(map, LATITUDE_KEYS).is_some() && number(map, LONGITUDE_KEYS).is_some();
    has_coordinates && (map.len() == 2 || (map.len() == 3 && map.contains_key(GEOHASH_KEY)))
}

fn map_geopoint(map: &DocumentData) -> Value {
    json!([
        number(map, LATITUDE_KEYS).unwrap_or_default(),
        number(map, LONGITUDE_KEYS).unwrap_or_default()
    ])
}

fn is_reference(map: &DocumentData) -> bool {
    map.get(REFERENCE_MARKER).and_then(DocumentValue::as_bool) == Some(true)
        && map.get(REFERENCE_PATH).and_then(DocumentValue::as_str).is_some()
}

fn map_reference(map: &DocumentData) -> Value {
    json!({ REFERENCE_PATH: map.get(REFERENCE_PATH).and_then(DocumentValue::as_str) })
}
