//! Interface definitions for the external systems the sync engine talks to.
//!
//! This module defines the abstract `SearchIndexProvider` and `DocumentStore`
//! traits that allow for dependency injection and swappable backends.

mod document_store;
mod search_index_provider;

pub use document_store::DocumentStore;
pub use search_index_provider::SearchIndexProvider;
