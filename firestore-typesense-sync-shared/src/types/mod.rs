//! This module defines the core data structures shared by the sync engine
//! and its storage backends.

pub mod buffer_entry;
pub mod document_value;
pub mod field_selector;
pub mod indexable_record;
pub mod path_pattern;
pub mod source_document;

pub use buffer_entry::{BufferEntry, BufferEntryError, BufferOperation, BufferStatus};
pub use document_value::{data_from_json, data_to_json, DocumentData, DocumentValue};
pub use field_selector::{FieldSelector, SelectedField};
pub use indexable_record::{IndexableRecord, ID_FIELD};
pub use path_pattern::{match_path, parse_pattern, PathBinding, PathError, PathPattern};
pub use source_document::{normalize_path, parent_path, SourceDocument};
