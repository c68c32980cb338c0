//! Error types for the sync repository.
//!
//! `SearchIndexError` covers every search index operation and `StoreError`
//! covers every source document store operation.

mod search_index_error;
mod store_error;

pub use search_index_error::SearchIndexError;
pub use store_error::StoreError;
