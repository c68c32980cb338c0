//! Request and response types for search index and document store operations.

use firestore_typesense_sync_shared::{DocumentData, DocumentValue, SourceDocument};

/// Write mode of a bulk import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportAction {
    Create,
    #[default]
    Upsert,
    Update,
    Emplace,
}

impl ImportAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Upsert => "upsert",
            Self::Update => "update",
            Self::Emplace => "emplace",
        }
    }
}

/// Result of a bulk import for a single record.
///
/// Mirrors one line of the engine's import response. `id` is always filled,
/// falling back to the id of the record submitted at the same position.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportItemResult {
    /// The record id.
    pub id: String,
    /// Whether the record was indexed.
    pub success: bool,
    /// Reason reported by the engine if the record was rejected.
    pub error: Option<String>,
    /// The rejected record as echoed by the engine, if any.
    pub document: Option<String>,
}

/// Summary of a bulk import containing aggregate statistics and per-record
/// results.
///
/// A partially failed import is still `Ok(ImportSummary)`; callers decide what
/// to do with `failures()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    /// Total number of records in the batch.
    pub total: usize,
    /// Number of indexed records.
    pub succeeded: usize,
    /// Number of rejected records.
    pub failed: usize,
    /// Individual results, in submission order.
    pub results: Vec<ImportItemResult>,
}

impl ImportSummary {
    pub fn from_results(results: Vec<ImportItemResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Rejected records.
    pub fn failures(&self) -> impl Iterator<Item = &ImportItemResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

/// Result of a bulk delete by id filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteByIdsResult {
    /// Number of documents the engine removed.
    pub num_deleted: usize,
    /// Ids of the removed documents, when the engine reports them.
    pub ids: Option<Vec<String>>,
}

impl DeleteByIdsResult {
    /// The requested ids that were not deleted.
    ///
    /// When fewer documents were deleted than requested but the engine did not
    /// report which ones, every requested id is considered missing.
    pub fn missing<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        if self.num_deleted >= requested.len() {
            return Vec::new();
        }
        match self.ids {
            Some(ref deleted) => requested
                .iter()
                .filter(|id| !deleted.contains(id))
                .map(String::as_str)
                .collect(),
            None => requested.iter().map(String::as_str).collect(),
        }
    }
}

/// Where a query reads documents from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    /// Documents directly inside the collection at this path.
    Collection(String),
    /// Documents in every collection with this id, at any depth.
    CollectionGroup(String),
}

/// Comparison applied by a field filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Equal(DocumentValue),
    In(Vec<DocumentValue>),
    LessThanOrEqual(DocumentValue),
}

/// A filter on a single (possibly dotted) field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
}

/// A query against the document store.
///
/// Results are ordered by `order_by` ascending (when set) and then by document
/// path. Documents lacking the `order_by` field are not returned.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub source: QuerySource,
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<String>,
    /// Resume strictly after this document.
    pub start_after: Option<SourceDocument>,
    pub limit: Option<usize>,
}

impl DocumentQuery {
    pub fn collection(path: impl Into<String>) -> Self {
        Self::new(QuerySource::Collection(path.into()))
    }

    pub fn collection_group(collection_id: impl Into<String>) -> Self {
        Self::new(QuerySource::CollectionGroup(collection_id.into()))
    }

    fn new(source: QuerySource) -> Self {
        Self {
            source,
            filters: Vec::new(),
            order_by: None,
            start_after: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<DocumentValue>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            op: FilterOp::Equal(value.into()),
        });
        self
    }

    pub fn where_in(mut self, field: impl Into<String>, values: Vec<DocumentValue>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            op: FilterOp::In(values),
        });
        self
    }

    pub fn where_lte(mut self, field: impl Into<String>, value: impl Into<DocumentValue>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            op: FilterOp::LessThanOrEqual(value.into()),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn start_after(mut self, cursor: SourceDocument) -> Self {
        self.start_after = Some(cursor);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A condition a write requires to hold at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The document exists (or not).
    Exists(bool),
    /// The document is at exactly this version.
    UpdateTime(String),
}

/// One write of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentWrite {
    /// Replace the whole document, creating it if needed.
    Set {
        path: String,
        data: DocumentData,
        precondition: Option<Precondition>,
    },
    /// Overwrite the given top-level fields of an existing document.
    Update {
        path: String,
        fields: DocumentData,
        precondition: Option<Precondition>,
    },
    /// Remove the document.
    Delete {
        path: String,
        precondition: Option<Precondition>,
    },
}

impl DocumentWrite {
    pub fn path(&self) -> &str {
        match self {
            Self::Set { path, .. } | Self::Update { path, .. } | Self::Delete { path, .. } => path,
        }
    }

    pub fn precondition(&self) -> Option<&Precondition> {
        match self {
            Self::Set { precondition, .. }
            | Self::Update { precondition, .. }
            | Self::Delete { precondition, .. } => precondition.as_ref(),
        }
    }
}
