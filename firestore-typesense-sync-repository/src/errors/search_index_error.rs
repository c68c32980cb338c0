//! Search index error types.
//!
//! This module defines the unified error type for all search index operations,
//! including both transport-level failures and per-operation failures reported
//! by the search engine.

use thiserror::Error;

/// Unified errors from search index operations.
///
/// Used by the `SearchIndexProvider` trait for all operations. A bulk import
/// that completes with per-item failures is not an error; see
/// `ImportSummary`. Only failures of the call as a whole land here.
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Validation error (e.g., invalid host configuration, empty id list).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// No configured node could be reached.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The search engine answered with a non-success status.
    #[error("Request failed with HTTP code {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// A bulk import call failed as a whole.
    #[error("Import error: {0}")]
    ImportError(String),

    /// Failed to delete one or more documents.
    #[error("Delete error: {0}")]
    DeleteError(String),

    /// Failed to create or delete the collection.
    #[error("Collection error: {0}")]
    CollectionError(String),

    /// Failed to parse a response from the search engine.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Failed to serialize data for the search engine.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Document not found.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Unknown error.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl SearchIndexError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create an HTTP status error.
    pub fn http_status(status: u16, msg: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            message: msg.into(),
        }
    }

    /// Create an import error.
    pub fn import(msg: impl Into<String>) -> Self {
        Self::ImportError(msg.into())
    }

    /// Create a delete error.
    pub fn delete(msg: impl Into<String>) -> Self {
        Self::DeleteError(msg.into())
    }

    /// Create a collection error.
    pub fn collection(msg: impl Into<String>) -> Self {
        Self::CollectionError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create a document not found error.
    pub fn document_not_found(id: &str) -> Self {
        Self::DocumentNotFound(id.to_string())
    }

    /// Create an unknown error.
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Whether this is a 404 from the search engine.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DocumentNotFound(_) | Self::HttpStatus { status: 404, .. }
        )
    }
}
