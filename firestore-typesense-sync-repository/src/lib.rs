//! # Firestore Typesense Sync Repository
//!
//! This crate provides traits and implementations for the external systems
//! the sync engine depends on: the Typesense search index and the Firestore
//! source database. It includes definitions for errors, interfaces, request
//! and response types, an HTTP Typesense provider, a Firestore REST store and
//! an in-memory store.

pub mod config;
pub mod errors;
pub mod firestore;
pub mod interfaces;
pub mod memory;
pub mod types;
pub mod typesense;
pub mod utils;

pub use config::{FirestoreConfig, TypesenseConfig};
pub use errors::{SearchIndexError, StoreError};
pub use firestore::FirestoreRestStore;
pub use interfaces::{DocumentStore, SearchIndexProvider};
pub use memory::InMemoryDocumentStore;
pub use types::{
    DeleteByIdsResult, DocumentQuery, DocumentWrite, FieldFilter, FilterOp, ImportAction,
    ImportItemResult, ImportSummary, Precondition, QuerySource,
};
pub use typesense::TypesenseProvider;
