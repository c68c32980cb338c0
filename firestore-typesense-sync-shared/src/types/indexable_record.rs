//! Indexable record types.
//!
//! This module defines the document structure that is sent to the search
//! engine.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::types::path_pattern::PathBinding;

/// Key holding the document id in every record.
pub const ID_FIELD: &str = "id";

/// A record ready to be indexed in the search engine.
///
/// Records are built once per source document version and never mutated
/// afterwards. The `id` key is always present and always a string.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexableRecord {
    id: String,
    fields: Map<String, Value>,
}

impl IndexableRecord {
    /// Build a record from projected fields.
    ///
    /// `id` overwrites any projected field of the same name, then every path
    /// binding is written as a string field, overwriting as well.
    ///
    /// # Example
    ///
    /// ```
    /// use firestore_typesense_sync_shared::{IndexableRecord, PathBinding};
    /// use serde_json::{json, Map};
    ///
    /// let mut params = PathBinding::new();
    /// params.insert("userId".to_string(), "123".to_string());
    ///
    /// let record = IndexableRecord::new("456", Map::new(), &params);
    /// assert_eq!(record.id(), "456");
    /// assert_eq!(record.get("userId"), Some(&json!("123")));
    /// ```
    pub fn new(id: impl Into<String>, mut fields: Map<String, Value>, params: &PathBinding) -> Self {
        let mut id = id.into();
        fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        for (key, value) in params {
            fields.insert(key.clone(), Value::String(value.clone()));
            if key == ID_FIELD {
                id = value.clone();
            }
        }
        Self { id, fields }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All fields, including `id`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_json(self) -> Value {
        Value::Object(self.fields)
    }
}

impl Serialize for IndexableRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_overwrites_projected_field() {
        let mut fields = Map::new();
        fields.insert("id".to_string(), json!(42));
        fields.insert("title".to_string(), json!("Title X"));

        let record = IndexableRecord::new("abc", fields, &PathBinding::new());
        assert_eq!(record.id(), "abc");
        assert_eq!(
            record.into_json(),
            json!({"id": "abc", "title": "Title X"})
        );
    }

    #[test]
    fn test_path_params_overwrite_fields() {
        let mut fields = Map::new();
        fields.insert("userId".to_string(), json!("stale"));
        let mut params = PathBinding::new();
        params.insert("userId".to_string(), "123".to_string());

        let record = IndexableRecord::new("abc", fields, &params);
        assert_eq!(record.get("userId"), Some(&json!("123")));
    }

    #[test]
    fn test_serializes_as_flat_object() {
        let record = IndexableRecord::new("abc", Map::new(), &PathBinding::new());
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"id":"abc"}"#);
    }
}
