//! Source document snapshot types.

use serde::{Deserialize, Serialize};

use crate::types::document_value::{DocumentData, DocumentValue};

/// A point-in-time snapshot of a document in the source database.
///
/// `path` alternates collection names and document ids
/// (`users/123/books/456`). `id` is always the final path segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub path: String,
    pub data: DocumentData,
    /// Store-specific update marker, used as a write precondition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SourceDocument {
    /// Create a snapshot for the document at `path`.
    ///
    /// Leading and trailing slashes are ignored.
    pub fn new(path: impl AsRef<str>, data: DocumentData) -> Self {
        let path = normalize_path(path.as_ref());
        let id = path.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            id,
            path,
            data,
            version: None,
        }
    }

    /// Set the store version of this snapshot.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Read a top-level field.
    pub fn get(&self, field: &str) -> Option<&DocumentValue> {
        self.data.get(field)
    }

    /// Path of the collection containing this document.
    pub fn collection_path(&self) -> &str {
        parent_path(&self.path)
    }

    /// Id of the collection containing this document (its last segment).
    pub fn collection_id(&self) -> &str {
        self.collection_path()
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

/// Drop empty segments from a `/`-delimited path.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Everything before the last `/` of a normalized path.
pub fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}
