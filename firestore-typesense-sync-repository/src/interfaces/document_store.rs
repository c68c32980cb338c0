//! Document store trait definition.
//!
//! The sync engine needs only point-in-time reads, ordered cursor queries and
//! atomic batched writes from the source database.

use async_trait::async_trait;
use firestore_typesense_sync_shared::{DocumentData, SourceDocument};

use crate::errors::StoreError;
use crate::types::{DocumentQuery, DocumentWrite};

/// Abstracts the source document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the current snapshot of the document at `path`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(SourceDocument))` - The snapshot, with its version set
    /// * `Ok(None)` - If no document exists at `path`
    /// * `Err(StoreError)` - If the read fails
    async fn get_document(&self, path: &str) -> Result<Option<SourceDocument>, StoreError>;

    /// Create a document with a generated id in `collection`.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The generated document id
    /// * `Err(StoreError)` - If the write fails
    async fn add_document(&self, collection: &str, data: DocumentData)
        -> Result<String, StoreError>;

    /// Run a query and return the matching snapshots in query order.
    async fn run_query(&self, query: &DocumentQuery) -> Result<Vec<SourceDocument>, StoreError>;

    /// Apply all writes atomically.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If every write was applied
    /// * `Err(StoreError::PreconditionFailed)` - If any precondition did not
    ///   hold; no write was applied
    /// * `Err(StoreError)` - If the commit fails for another reason
    async fn commit(&self, writes: Vec<DocumentWrite>) -> Result<(), StoreError>;
}
