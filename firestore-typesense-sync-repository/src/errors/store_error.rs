//! Document store error types.

use thiserror::Error;

/// Errors from source document store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Failed to reach the store.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The store answered with a non-success status.
    #[error("Request failed with HTTP code {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// A write targeted a document that does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// A write precondition did not hold; nothing in the batch was applied.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// A value could not be converted to or from the wire format.
    #[error("Codec error: {0}")]
    CodecError(String),

    /// The query cannot be executed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Unknown error.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl StoreError {
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

    /// Create a not found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a precondition failed error.
    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    /// Create a codec error.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::CodecError(msg.into())
    }

    /// Create an invalid query error.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Create an unknown error.
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }
}
