//! # Firestore Typesense Sync Shared
//!
//! This crate defines shared data structures used across the Firestore to
//! Typesense sync engine. It includes the source document value tree, path
//! patterns, indexable records and the persisted buffer entry.

pub mod types;

pub use types::{
    data_from_json, data_to_json, match_path, normalize_path, parent_path, parse_pattern,
    BufferEntry, BufferEntryError, BufferOperation, BufferStatus, DocumentData, DocumentValue,
    FieldSelector, IndexableRecord, PathBinding, PathError, PathPattern, SelectedField,
    SourceDocument, ID_FIELD,
};
