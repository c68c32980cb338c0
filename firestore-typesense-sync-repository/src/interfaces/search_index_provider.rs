//! Search index provider trait definition.
//!
//! This module defines the abstract interface for search index operations,
//! allowing for different backend implementations.

use async_trait::async_trait;
use firestore_typesense_sync_shared::IndexableRecord;
use serde_json::Value;

use crate::errors::SearchIndexError;
use crate::types::{DeleteByIdsResult, ImportAction, ImportSummary};

/// Abstracts the underlying search index implementation.
///
/// Every provider is bound to a single collection. Implementations are
/// injected into the sync engine components to enable easy testing with mock
/// implementations.
///
/// All methods return `Result<T, SearchIndexError>` for consistent error
/// handling across different backend implementations.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Check that the search engine is reachable and healthy.
    async fn health(&self) -> Result<(), SearchIndexError>;

    /// Create the collection from a schema.
    ///
    /// # Arguments
    ///
    /// * `schema` - The collection schema; its `name` defaults to the bound collection
    ///
    /// # Returns
    ///
    /// * `Ok(Value)` - The created collection as reported by the engine
    /// * `Err(SearchIndexError)` - If creation fails
    async fn create_collection(&self, schema: &Value) -> Result<Value, SearchIndexError>;

    /// Delete the collection. A missing collection is not an error.
    async fn delete_collection(&self) -> Result<(), SearchIndexError>;

    /// Index a new document. Fails if the id already exists.
    async fn create_document(&self, record: &IndexableRecord) -> Result<(), SearchIndexError>;

    /// Create or replace a document.
    async fn upsert_document(&self, record: &IndexableRecord) -> Result<(), SearchIndexError>;

    /// Delete a document by id.
    ///
    /// If the document doesn't exist, the operation is considered successful.
    ///
    /// # Arguments
    ///
    /// * `id` - The document id
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was deleted (or didn't exist)
    /// * `Err(SearchIndexError)` - If the deletion fails
    async fn delete_document(&self, id: &str) -> Result<(), SearchIndexError>;

    /// Index many records in one call and report the outcome of each.
    ///
    /// # Arguments
    ///
    /// * `records` - The records to import
    /// * `action` - The write mode
    ///
    /// # Returns
    ///
    /// * `Ok(ImportSummary)` - Per-record results, which may include failures
    /// * `Err(SearchIndexError)` - If the call fails as a whole
    async fn import_documents(
        &self,
        records: &[IndexableRecord],
        action: ImportAction,
    ) -> Result<ImportSummary, SearchIndexError>;

    /// Delete every document whose id is in `ids`.
    ///
    /// # Returns
    ///
    /// * `Ok(DeleteByIdsResult)` - The number of deleted documents and, when
    ///   reported, their ids
    /// * `Err(SearchIndexError)` - If the call fails as a whole
    async fn delete_documents_by_ids(
        &self,
        ids: &[String],
    ) -> Result<DeleteByIdsResult, SearchIndexError>;

    /// Export every document of the collection.
    async fn export_documents(&self) -> Result<Vec<Value>, SearchIndexError>;
}
