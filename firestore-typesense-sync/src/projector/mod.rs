//! Projection of source documents into indexable records.
//!
//! A projection runs four steps: extraction of the selected fields, value
//! mapping, optional flattening, then injection of the id and the path
//! bindings.

mod extract;
mod flatten;
mod value_mapper;

pub use extract::extract_fields;
pub use flatten::flatten;
pub use value_mapper::{map_fields, map_value, shape_name};

use firestore_typesense_sync_shared::{
    DocumentData, FieldSelector, IndexableRecord, PathBinding, SourceDocument,
};

use crate::config::SyncConfig;

/// Builds indexable records from document data.
#[derive(Debug, Clone, Default)]
pub struct DocumentProjector {
    selector: FieldSelector,
    flatten: bool,
}

impl DocumentProjector {
    pub fn new(selector: FieldSelector, flatten: bool) -> Self {
        Self { selector, flatten }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.field_selector.clone(),
            config.flatten_nested_documents,
        )
    }

    pub fn selector(&self) -> &FieldSelector {
        &self.selector
    }

    /// Project document data into a record.
    ///
    /// # Arguments
    ///
    /// * `id` - The document id; overwrites any extracted `id` field
    /// * `data` - The raw document fields
    /// * `params` - Path bindings, written last as string fields
    pub fn project(&self, id: &str, data: &DocumentData, params: &PathBinding) -> IndexableRecord {
        let extracted = extract_fields(data, self.selector.paths());
        let mut fields = map_fields(&extracted);
        if self.flatten {
            fields = flatten(fields);
        }
        for rename in self.selector.renames() {
            if let Some(value) = fields.remove(&rename.path) {
                fields.insert(rename.target.clone(), value);
            }
        }
        IndexableRecord::new(id, fields, params)
    }

    /// Project a snapshot.
    pub fn project_snapshot(&self, snapshot: &SourceDocument, params: &PathBinding) -> IndexableRecord {
        self.project(&snapshot.id, &snapshot.data, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firestore_typesense_sync_shared::{data_from_json, DocumentValue};
    use serde_json::{json, Value};

    fn record(projector: &DocumentProjector, doc: Value, params: &[(&str, &str)]) -> Value {
        let params: PathBinding = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        projector
            .project("doc1", &data_from_json(doc), &params)
            .into_json()
    }

    #[test]
    fn test_selected_fields_only() {
        let projector = DocumentProjector::new(FieldSelector::parse("author,title"), false);
        let doc = json!({"author": "Author A", "title": "Title X", "country": "USA"});
        assert_eq!(
            record(&projector, doc, &[]),
            json!({"id": "doc1", "author": "Author A", "title": "Title X"})
        );
    }

    #[test]
    fn test_all_fields_mapped_and_flattened() {
        let projector = DocumentProjector::new(FieldSelector::all(), true);
        let doc = json!({
            "createdAt": {"_seconds": 1_700_000_000, "_nanoseconds": 0},
            "location": {"latitude": 1.0, "longitude": 2.0},
            "owner": {"_reference": true, "path": "users/u1"},
            "stats": {"views": 10, "likes": {}}
        });
        assert_eq!(
            record(&projector, doc, &[]),
            json!({
                "id": "doc1",
                "createdAt": 1_700_000_000,
                "location": [1.0, 2.0],
                "owner.path": "users/u1",
                "stats.views": 10
            })
        );
    }

    #[test]
    fn test_nested_mode_keeps_structure() {
        let projector = DocumentProjector::new(FieldSelector::parse("user.name"), false);
        let doc = json!({"user": {"name": "Ada", "age": 36}});
        assert_eq!(
            record(&projector, doc, &[]),
            json!({"id": "doc1", "user": {"name": "Ada"}})
        );
    }

    #[test]
    fn test_id_and_params_overwrite_fields() {
        let projector = DocumentProjector::default();
        let doc = json!({"id": "stale", "userId": "wrong", "title": "x"});
        assert_eq!(
            record(&projector, doc, &[("userId", "123")]),
            json!({"id": "doc1", "userId": "123", "title": "x"})
        );
    }

    #[test]
    fn test_renames_after_flattening() {
        let projector = DocumentProjector::new(FieldSelector::parse("user.name=author, title"), true);
        let doc = json!({"user": {"name": "Ada"}, "title": "x"});
        assert_eq!(
            record(&projector, doc, &[]),
            json!({"id": "doc1", "author": "Ada", "title": "x"})
        );
    }

    #[test]
    fn test_project_snapshot_uses_document_id() {
        let mut data = DocumentData::new();
        data.insert("title".to_string(), DocumentValue::from("Dune"));
        let snapshot = SourceDocument::new("users/u1/books/b7", data);

        let projector = DocumentProjector::default();
        let record = projector.project_snapshot(&snapshot, &PathBinding::new());
        assert_eq!(record.id(), "b7");
        assert_eq!(record.get("title"), Some(&json!("Dune")));
    }
}
