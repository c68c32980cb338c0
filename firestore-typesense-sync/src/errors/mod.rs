//! Error types for the sync engine.

use firestore_typesense_sync_repository::{SearchIndexError, StoreError};
use firestore_typesense_sync_shared::{BufferEntryError, PathError};
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set or is blank.
    #[error("Missing required environment variable {0}")]
    Missing(String),

    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {variable}: {message}")]
    Invalid { variable: String, message: String },
}

impl ConfigError {
    /// Create a missing variable error.
    pub fn missing(variable: impl Into<String>) -> Self {
        Self::Missing(variable.into())
    }

    /// Create an invalid value error.
    pub fn invalid(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            variable: variable.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur in the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed path or path pattern.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Search index error.
    #[error("Search index error: {0}")]
    SearchIndex(#[from] SearchIndexError),

    /// Document store error.
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    /// Buffer entry error.
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferEntryError),
}
