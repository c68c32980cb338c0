//! In-memory document store.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::mem::discriminant;
use std::sync::RwLock;

use async_trait::async_trait;
use firestore_typesense_sync_shared::{
    normalize_path, parent_path, DocumentData, DocumentValue, SourceDocument,
};
use tracing::debug;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::interfaces::DocumentStore;
use crate::types::{DocumentQuery, DocumentWrite, FieldFilter, FilterOp, Precondition, QuerySource};
use crate::utils::lookup_field;

#[derive(Debug, Clone)]
struct StoredDocument {
    data: DocumentData,
    version: u64,
}

#[derive(Debug, Default)]
struct State {
    documents: BTreeMap<String, StoredDocument>,
    next_version: u64,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn snapshot(&self, path: &str) -> Option<SourceDocument> {
        self.documents.get(path).map(|stored| {
            SourceDocument::new(path, stored.data.clone()).with_version(stored.version.to_string())
        })
    }
}

/// Document store held entirely in memory.
///
/// Honors the full `DocumentStore` contract, including atomic commits with
/// preconditions, so it can stand in for the real database in tests and
/// local runs. Versions are a process-wide counter.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    state: RwLock<State>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a document directly, replacing any existing one.
    pub fn insert(&self, path: &str, data: DocumentData) -> Result<(), StoreError> {
        let mut state = self.write_state()?;
        let version = state.bump();
        state
            .documents
            .insert(normalize_path(path), StoredDocument { data, version });
        Ok(())
    }

    /// Remove a document directly.
    pub fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.write_state()?.documents.remove(&normalize_path(path));
        Ok(())
    }

    /// Snapshots of every document directly inside `collection`, by path.
    pub fn list(&self, collection: &str) -> Result<Vec<SourceDocument>, StoreError> {
        let collection = normalize_path(collection);
        let state = self.read_state()?;
        Ok(state
            .documents
            .keys()
            .filter(|path| parent_path(path) == collection)
            .filter_map(|path| state.snapshot(path))
            .collect())
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|e| StoreError::unknown(format!("Store lock poisoned: {}", e)))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|e| StoreError::unknown(format!("Store lock poisoned: {}", e)))
    }

    fn check_precondition(
        state: &State,
        path: &str,
        precondition: Option<&Precondition>,
    ) -> Result<(), StoreError> {
        let current = state.documents.get(path);
        match precondition {
            None => Ok(()),
            Some(Precondition::Exists(expected)) if current.is_some() == *expected => Ok(()),
            Some(Precondition::Exists(expected)) => Err(StoreError::precondition_failed(format!(
                "{} exists={} expected {}",
                path,
                current.is_some(),
                expected
            ))),
            Some(Precondition::UpdateTime(version)) => match current {
                Some(stored) if stored.version.to_string() == *version => Ok(()),
                _ => Err(StoreError::precondition_failed(format!(
                    "{} is no longer at version {}",
                    path, version
                ))),
            },
        }
    }
}

fn source_matches(source: &QuerySource, path: &str) -> bool {
    let parent = parent_path(path);
    match source {
        QuerySource::Collection(collection) => parent == normalize_path(collection),
        QuerySource::CollectionGroup(collection_id) => {
            parent.rsplit('/').next() == Some(collection_id.as_str())
        }
    }
}

/// Inequalities only hold between values of the same kind.
fn comparable(a: &DocumentValue, b: &DocumentValue) -> bool {
    (a.as_f64().is_some() && b.as_f64().is_some()) || discriminant(a) == discriminant(b)
}

fn filter_matches(data: &DocumentData, filter: &FieldFilter) -> bool {
    let Some(value) = lookup_field(data, &filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Equal(ref expected) => value.compare(expected) == CmpOrdering::Equal,
        FilterOp::In(ref candidates) => candidates
            .iter()
            .any(|candidate| value.compare(candidate) == CmpOrdering::Equal),
        FilterOp::LessThanOrEqual(ref bound) => {
            comparable(value, bound) && value.compare(bound) != CmpOrdering::Greater
        }
    }
}

/// Sort key of a document under `order_by`: the field value (if ordering by
/// one) followed by the path.
fn compare_keys(
    order_by: Option<&str>,
    a: (&DocumentData, &str),
    b: (&DocumentData, &str),
) -> CmpOrdering {
    let by_field = match order_by {
        Some(field) => match (lookup_field(a.0, field), lookup_field(b.0, field)) {
            (Some(x), Some(y)) => x.compare(y),
            _ => CmpOrdering::Equal,
        },
        None => CmpOrdering::Equal,
    };
    by_field.then_with(|| a.1.cmp(b.1))
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(&self, path: &str) -> Result<Option<SourceDocument>, StoreError> {
        Ok(self.read_state()?.snapshot(&normalize_path(path)))
    }

    async fn add_document(
        &self,
        collection: &str,
        data: DocumentData,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let path = format!("{}/{}", normalize_path(collection), id);
        self.insert(&path, data)?;
        Ok(id)
    }

    async fn run_query(&self, query: &DocumentQuery) -> Result<Vec<SourceDocument>, StoreError> {
        let state = self.read_state()?;
        let order_by = query.order_by.as_deref();

        let mut matches: Vec<(&String, &StoredDocument)> = state
            .documents
            .iter()
            .filter(|(path, _)| source_matches(&query.source, path))
            .filter(|(_, stored)| order_by.map_or(true, |f| lookup_field(&stored.data, f).is_some()))
            .filter(|(_, stored)| query.filters.iter().all(|f| filter_matches(&stored.data, f)))
            .collect();

        matches.sort_by(|(pa, a), (pb, b)| {
            compare_keys(order_by, (&a.data, pa.as_str()), (&b.data, pb.as_str()))
        });

        if let Some(ref cursor) = query.start_after {
            if let Some(field) = order_by {
                if lookup_field(&cursor.data, field).is_none() {
                    return Err(StoreError::invalid_query(format!(
                        "Cursor document {} lacks order field {}",
                        cursor.path, field
                    )));
                }
            }
            matches.retain(|(path, stored)| {
                compare_keys(
                    order_by,
                    (&stored.data, path.as_str()),
                    (&cursor.data, cursor.path.as_str()),
                ) == CmpOrdering::Greater
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matches
            .into_iter()
            .take(limit)
            .filter_map(|(path, _)| state.snapshot(path))
            .collect())
    }

    async fn commit(&self, writes: Vec<DocumentWrite>) -> Result<(), StoreError> {
        let mut state = self.write_state()?;

        for write in &writes {
            let path = normalize_path(write.path());
            Self::check_precondition(&state, &path, write.precondition())?;
            if matches!(write, DocumentWrite::Update { .. }) && !state.documents.contains_key(&path)
            {
                return Err(StoreError::not_found(path));
            }
        }

        let count = writes.len();
        for write in writes {
            let version = state.bump();
            match write {
                DocumentWrite::Set { path, data, .. } => {
                    state
                        .documents
                        .insert(normalize_path(&path), StoredDocument { data, version });
                }
                DocumentWrite::Update { path, fields, .. } => {
                    if let Some(stored) = state.documents.get_mut(&normalize_path(&path)) {
                        stored.data.extend(fields);
                        stored.version = version;
                    }
                }
                DocumentWrite::Delete { path, .. } => {
                    state.documents.remove(&normalize_path(&path));
                }
            }
        }

        debug!(writes = count, "Committed in-memory writes");
        Ok(())
    }
}
