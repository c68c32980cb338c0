//! Buffer entry types.
//!
//! A buffer entry is a pending index mutation persisted in the source
//! database. Its status follows an explicit state machine:
//!
//! ```text
//! pending ──┐
//!           ├──► processing ──► completed
//! retrying ─┘         │
//!     ▲               ├──► retrying
//!     └───────────────┘
//!                     └──► failed
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::types::document_value::{DocumentData, DocumentValue};
use crate::types::path_pattern::PathBinding;

pub const FIELD_DOCUMENT_ID: &str = "documentId";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_DOCUMENT: &str = "document";
pub const FIELD_PATH_PARAMS: &str = "pathParams";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_RETRIES: &str = "retries";
pub const FIELD_LAST_ERROR: &str = "lastError";
pub const FIELD_CLAIMED_AT: &str = "claimedAt";

/// Errors from buffer entry handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferEntryError {
    /// The requested status change is not in the transition table.
    #[error("Invalid buffer status transition from {from} to {to}")]
    InvalidTransition { from: BufferStatus, to: BufferStatus },

    /// A stored entry is missing a field or has the wrong type.
    #[error("Malformed buffer entry: {0}")]
    Malformed(String),
}

/// The index mutation a buffer entry requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferOperation {
    Upsert,
    Delete,
}

impl BufferOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for BufferOperation {
    type Err = BufferEntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upsert" => Ok(Self::Upsert),
            "delete" => Ok(Self::Delete),
            other => Err(BufferEntryError::Malformed(format!(
                "unknown operation type '{}'",
                other
            ))),
        }
    }
}

/// Processing state of a buffer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferStatus {
    Pending,
    Processing,
    Retrying,
    Completed,
    Failed,
}

impl BufferStatus {
    /// Statuses a drain may claim.
    pub const CLAIMABLE: [BufferStatus; 2] = [BufferStatus::Pending, BufferStatus::Retrying];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` and `failed` are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: BufferStatus) -> bool {
        use BufferStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Retrying, Processing)
                | (Processing, Completed)
                | (Processing, Retrying)
                | (Processing, Failed)
        )
    }

    /// Validate a status change against the transition table.
    pub fn transition(self, next: BufferStatus) -> Result<BufferStatus, BufferEntryError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(BufferEntryError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BufferStatus {
    type Err = BufferEntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "retrying" => Ok(Self::Retrying),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(BufferEntryError::Malformed(format!(
                "unknown status '{}'",
                other
            ))),
        }
    }
}

/// A queued index mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferEntry {
    pub document_id: String,
    pub operation: BufferOperation,
    pub status: BufferStatus,
    /// Raw source snapshot; present only for upserts.
    pub document: Option<DocumentData>,
    pub path_params: PathBinding,
    /// Creation time in epoch millis; the FIFO ordering key.
    pub timestamp: i64,
    pub retries: u32,
    pub last_error: Option<String>,
    /// Epoch millis of the last claim.
    pub claimed_at: Option<i64>,
}

impl BufferEntry {
    /// A new pending upsert.
    pub fn upsert(
        document_id: impl Into<String>,
        document: DocumentData,
        path_params: PathBinding,
        timestamp: i64,
    ) -> Self {
        Self::new(
            document_id.into(),
            BufferOperation::Upsert,
            Some(document),
            path_params,
            timestamp,
        )
    }

    /// A new pending delete.
    pub fn delete(document_id: impl Into<String>, path_params: PathBinding, timestamp: i64) -> Self {
        Self::new(
            document_id.into(),
            BufferOperation::Delete,
            None,
            path_params,
            timestamp,
        )
    }

    fn new(
        document_id: String,
        operation: BufferOperation,
        document: Option<DocumentData>,
        path_params: PathBinding,
        timestamp: i64,
    ) -> Self {
        Self {
            document_id,
            operation,
            status: BufferStatus::Pending,
            document,
            path_params,
            timestamp,
            retries: 0,
            last_error: None,
            claimed_at: None,
        }
    }

    /// Move to `processing`.
    pub fn claim(&mut self, now: i64) -> Result<(), BufferEntryError> {
        self.status = self.status.transition(BufferStatus::Processing)?;
        self.claimed_at = Some(now);
        Ok(())
    }

    /// Move to `completed`.
    pub fn complete(&mut self) -> Result<(), BufferEntryError> {
        self.status = self.status.transition(BufferStatus::Completed)?;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Once `retries` has reached `max_retries` the entry becomes `failed`;
    /// otherwise it becomes `retrying` and the counter is incremented. The
    /// error message is recorded either way.
    pub fn record_failure(
        &mut self,
        message: impl Into<String>,
        max_retries: u32,
    ) -> Result<BufferStatus, BufferEntryError> {
        if self.retries >= max_retries {
            self.status = self.status.transition(BufferStatus::Failed)?;
        } else {
            self.status = self.status.transition(BufferStatus::Retrying)?;
            self.retries += 1;
        }
        self.last_error = Some(message.into());
        Ok(self.status)
    }

    /// The mutable bookkeeping fields, as written back to the store.
    pub fn status_fields(&self) -> DocumentData {
        let mut fields = DocumentData::new();
        fields.insert(FIELD_STATUS.to_string(), self.status.as_str().into());
        fields.insert(FIELD_RETRIES.to_string(), self.retries.into());
        if let Some(ref error) = self.last_error {
            fields.insert(FIELD_LAST_ERROR.to_string(), error.clone().into());
        }
        if let Some(claimed_at) = self.claimed_at {
            fields.insert(FIELD_CLAIMED_AT.to_string(), claimed_at.into());
        }
        fields
    }

    /// The full stored form of the entry.
    pub fn to_document_data(&self) -> DocumentData {
        let mut data = self.status_fields();
        data.insert(
            FIELD_DOCUMENT_ID.to_string(),
            self.document_id.clone().into(),
        );
        data.insert(FIELD_TYPE.to_string(), self.operation.as_str().into());
        data.insert(FIELD_TIMESTAMP.to_string(), self.timestamp.into());
        data.insert(
            FIELD_PATH_PARAMS.to_string(),
            DocumentValue::Map(
                self.path_params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone().into()))
                    .collect(),
            ),
        );
        if let Some(ref document) = self.document {
            data.insert(
                FIELD_DOCUMENT.to_string(),
                DocumentValue::Map(document.clone()),
            );
        }
        data
    }

    /// Parse a stored entry.
    pub fn from_document_data(data: &DocumentData) -> Result<Self, BufferEntryError> {
        let document_id = required_str(data, FIELD_DOCUMENT_ID)?.to_string();
        let operation = required_str(data, FIELD_TYPE)?.parse()?;
        let status = required_str(data, FIELD_STATUS)?.parse()?;

        let document = match data.get(FIELD_DOCUMENT) {
            Some(DocumentValue::Map(map)) => Some(map.clone()),
            Some(DocumentValue::Null) | None => None,
            Some(_) => {
                return Err(BufferEntryError::Malformed(format!(
                    "{} must be a map",
                    FIELD_DOCUMENT
                )))
            }
        };

        let path_params = match data.get(FIELD_PATH_PARAMS) {
            Some(DocumentValue::Map(map)) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect(),
            _ => PathBinding::new(),
        };

        let timestamp = data
            .get(FIELD_TIMESTAMP)
            .and_then(DocumentValue::as_f64)
            .map(|t| t as i64)
            .ok_or_else(|| BufferEntryError::Malformed(format!("missing {}", FIELD_TIMESTAMP)))?;

        let retries = data
            .get(FIELD_RETRIES)
            .and_then(DocumentValue::as_i64)
            .map(|r| r.max(0) as u32)
            .unwrap_or(0);

        Ok(Self {
            document_id,
            operation,
            status,
            document,
            path_params,
            timestamp,
            retries,
            last_error: data
                .get(FIELD_LAST_ERROR)
                .and_then(DocumentValue::as_str)
                .map(str::to_string),
            claimed_at: data.get(FIELD_CLAIMED_AT).and_then(DocumentValue::as_i64),
        })
    }
}

fn required_str<'a>(data: &'a DocumentData, field: &str) -> Result<&'a str, BufferEntryError> {
    data.get(field)
        .and_then(DocumentValue::as_str)
        .ok_or_else(|| BufferEntryError::Malformed(format!("missing {}", field)))
}
