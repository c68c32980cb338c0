//! Collapsing of nested records into dot-joined keys.

use serde_json::{Map, Value};

/// Flatten a mapped record.
///
/// Nested objects become `parent.child` keys and empty objects disappear. An
/// array whose elements are all objects is transposed into one array per
/// child field, leaving out elements that lack the field. Other arrays pass
/// through unchanged.
///
/// # Example
///
/// ```
/// use firestore_typesense_sync::projector::flatten;
/// use serde_json::json;
///
/// let nested = json!({
///     "user": {"name": "Ada", "address": {"city": "London"}},
///     "tags": ["a", "b"],
/// });
/// let flat = flatten(nested.as_object().unwrap().clone());
/// assert_eq!(json!(flat), json!({
///     "user.name": "Ada",
///     "user.address.city": "London",
///     "tags": ["a", "b"],
/// }));
/// ```
pub fn flatten(record: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in record {
        flatten_into(&mut out, key, value);
    }
    out
}

fn flatten_into(out: &mut Map<String, Value>, prefix: String, value: Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(out, format!("{}.{}", prefix, key), child);
            }
        }
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
            for (key, column) in transpose(items) {
                flatten_into(out, format!("{}.{}", prefix, key), Value::Array(column));
            }
        }
        other => {
            out.insert(prefix, other);
        }
    }
}

/// Turn an array of objects into per-field columns, in first-seen key order.
fn transpose(items: Vec<Value>) -> Vec<(String, Vec<Value>)> {
    let mut columns: Vec<(String, Vec<Value>)> = Vec::new();
    for item in items {
        let Value::Object(map) = item else { continue };
        for (key, value) in map {
            match columns.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, column)) => column.push(value),
                None => columns.push((key, vec![value])),
            }
        }
    }
    columns
}
