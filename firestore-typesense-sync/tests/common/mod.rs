//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use firestore_typesense_sync::SyncConfig;
use firestore_typesense_sync_repository::{
    DeleteByIdsResult, DocumentQuery, DocumentStore, DocumentWrite, ImportAction,
    ImportItemResult, ImportSummary, InMemoryDocumentStore, SearchIndexError,
    SearchIndexProvider, StoreError,
};
use firestore_typesense_sync_shared::{
    data_from_json, DocumentData, IndexableRecord, SourceDocument,
};
use serde_json::Value;

/// Build a configuration over the required variables plus `overrides`.
pub fn config(overrides: &[(&str, &str)]) -> SyncConfig {
    let mut vars: BTreeMap<String, String> = [
        ("FIRESTORE_COLLECTION_PATH", "books"),
        ("TYPESENSE_HOSTS", "localhost"),
        ("TYPESENSE_COLLECTION_NAME", "books"),
        ("TYPESENSE_API_KEY", "xyz"),
        ("FIRESTORE_PROJECT_ID", "demo"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    SyncConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn data(value: Value) -> DocumentData {
    data_from_json(value)
}

// Mock Search Provider for testing
#[derive(Default)]
pub struct MockSearchProvider {
    pub documents: Mutex<BTreeMap<String, IndexableRecord>>,
    pub import_calls: Mutex<Vec<Vec<String>>>,
    pub delete_calls: Mutex<Vec<Vec<String>>>,
    /// Ids the import rejects.
    pub rejected_ids: Mutex<BTreeSet<String>>,
    /// Fail every call with a connection error.
    pub unavailable: Mutex<bool>,
}

impl MockSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&self, id: &str) {
        self.rejected_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn seed(&self, id: &str) {
        let record = IndexableRecord::new(id, Default::default(), &Default::default());
        self.documents.lock().unwrap().insert(id.to_string(), record);
    }

    pub fn ids(&self) -> Vec<String> {
        self.documents.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<IndexableRecord> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    pub fn import_count(&self) -> usize {
        self.import_calls.lock().unwrap().len()
    }

    fn check_available(&self) -> Result<(), SearchIndexError> {
        if *self.unavailable.lock().unwrap() {
            Err(SearchIndexError::connection("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SearchIndexProvider for MockSearchProvider {
    async fn health(&self) -> Result<(), SearchIndexError> {
        self.check_available()
    }

    async fn create_collection(&self, schema: &Value) -> Result<Value, SearchIndexError> {
        self.check_available()?;
        Ok(schema.clone())
    }

    async fn delete_collection(&self) -> Result<(), SearchIndexError> {
        self.check_available()?;
        self.documents.lock().unwrap().clear();
        Ok(())
    }

    async fn create_document(&self, record: &IndexableRecord) -> Result<(), SearchIndexError> {
        self.upsert_document(record).await
    }

    async fn upsert_document(&self, record: &IndexableRecord) -> Result<(), SearchIndexError> {
        self.check_available()?;
        self.documents
            .lock()
            .unwrap()
            .insert(record.id().to_string(), record.clone());
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<(), SearchIndexError> {
        self.check_available()?;
        self.documents.lock().unwrap().remove(id);
        Ok(())
    }

    async fn import_documents(
        &self,
        records: &[IndexableRecord],
        _action: ImportAction,
    ) -> Result<ImportSummary, SearchIndexError> {
        self.check_available()?;
        self.import_calls
            .lock()
            .unwrap()
            .push(records.iter().map(|r| r.id().to_string()).collect());

        let rejected = self.rejected_ids.lock().unwrap().clone();
        let mut documents = self.documents.lock().unwrap();
        let results = records
            .iter()
            .map(|record| {
                let success = !rejected.contains(record.id());
                if success {
                    documents.insert(record.id().to_string(), record.clone());
                }
                ImportItemResult {
                    id: record.id().to_string(),
                    success,
                    error: (!success).then(|| "Field `year` must be an int32.".to_string()),
                    document: None,
                }
            })
            .collect();
        Ok(ImportSummary::from_results(results))
    }

    async fn delete_documents_by_ids(
        &self,
        ids: &[String],
    ) -> Result<DeleteByIdsResult, SearchIndexError> {
        self.check_available()?;
        self.delete_calls.lock().unwrap().push(ids.to_vec());
        let mut documents = self.documents.lock().unwrap();
        let deleted: Vec<String> = ids
            .iter()
            .filter(|id| documents.remove(id.as_str()).is_some())
            .cloned()
            .collect();
        Ok(DeleteByIdsResult {
            num_deleted: deleted.len(),
            ids: Some(deleted),
        })
    }

    async fn export_documents(&self) -> Result<Vec<Value>, SearchIndexError> {
        self.check_available()?;
        Ok(self
            .documents
            .lock()
            .unwrap()
            .values()
            .map(|r| r.clone().into_json())
            .collect())
    }
}

/// In-memory store that counts commits and can fail a chosen one.
pub struct FlakyStore {
    pub inner: Arc<InMemoryDocumentStore>,
    pub commits: Mutex<usize>,
    /// 1-based number of the commit to reject.
    pub fail_commit: Mutex<Option<usize>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InMemoryDocumentStore::new()),
            commits: Mutex::new(0),
            fail_commit: Mutex::new(None),
        }
    }

    pub fn fail_commit(&self, number: usize) {
        *self.fail_commit.lock().unwrap() = Some(number);
    }

    pub fn commit_count(&self) -> usize {
        *self.commits.lock().unwrap()
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get_document(&self, path: &str) -> Result<Option<SourceDocument>, StoreError> {
        self.inner.get_document(path).await
    }

    async fn add_document(
        &self,
        collection: &str,
        data: DocumentData,
    ) -> Result<String, StoreError> {
        self.inner.add_document(collection, data).await
    }

    async fn run_query(&self, query: &DocumentQuery) -> Result<Vec<SourceDocument>, StoreError> {
        self.inner.run_query(query).await
    }

    async fn commit(&self, writes: Vec<DocumentWrite>) -> Result<(), StoreError> {
        let number = {
            let mut commits = self.commits.lock().unwrap();
            *commits += 1;
            *commits
        };
        if *self.fail_commit.lock().unwrap() == Some(number) {
            return Err(StoreError::connection("transient"));
        }
        self.inner.commit(writes).await
    }
}
