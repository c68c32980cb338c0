//! Durable queue of index mutations stored in the source database.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use firestore_typesense_sync_repository::{
    DocumentQuery, DocumentStore, DocumentWrite, Precondition, StoreError,
};
use firestore_typesense_sync_shared::types::buffer_entry::{
    FIELD_LAST_ERROR, FIELD_RETRIES, FIELD_STATUS, FIELD_TIMESTAMP,
};
use firestore_typesense_sync_shared::{
    BufferEntry, BufferStatus, DocumentData, DocumentValue, SourceDocument,
};
use tracing::{debug, error, info, warn};

use crate::errors::SyncError;

/// Error recorded on entries requeued by the staleness sweep.
pub const PROCESSING_TIMED_OUT: &str = "Processing timed out";

/// A buffer entry claimed by the current drain, with its stored location.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedEntry {
    pub path: String,
    pub entry: BufferEntry,
}

/// A claimed entry whose mutation did not reach the index.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedEntry {
    pub claimed: ClaimedEntry,
    pub message: String,
}

/// The buffer collection and its retry policy.
#[derive(Clone)]
pub struct Buffer {
    store: Arc<dyn DocumentStore>,
    collection: String,
    max_retries: u32,
}

impl Buffer {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>, max_retries: u32) -> Self {
        Self {
            store,
            collection: collection.into(),
            max_retries,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Append an entry.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The id of the stored entry
    /// * `Err(SyncError)` - If the write fails
    pub async fn enqueue(&self, entry: &BufferEntry) -> Result<String, SyncError> {
        let id = self
            .store
            .add_document(&self.collection, entry.to_document_data())
            .await?;
        debug!(
            buffer_id = %id,
            document_id = %entry.document_id,
            operation = entry.operation.as_str(),
            "Added document to buffer"
        );
        Ok(id)
    }

    /// Claim up to `max` entries, oldest first.
    ///
    /// Selected entries are moved to `processing` in one atomic write guarded
    /// by their read versions. When another drain claimed any of them first
    /// the write is rejected and nothing is returned.
    ///
    /// Entries that cannot be parsed are marked `failed` and skipped.
    pub async fn claim_batch(&self, max: usize) -> Result<Vec<ClaimedEntry>, SyncError> {
        let query = DocumentQuery::collection(&self.collection)
            .where_in(
                FIELD_STATUS,
                BufferStatus::CLAIMABLE
                    .iter()
                    .map(|status| DocumentValue::from(status.as_str()))
                    .collect(),
            )
            .where_lte(FIELD_RETRIES, i64::from(self.max_retries))
            .order_by(FIELD_TIMESTAMP)
            .limit(max);

        let documents = self.store.run_query(&query).await?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now().timestamp_millis();
        let mut writes = Vec::with_capacity(documents.len());
        let mut claimed = Vec::with_capacity(documents.len());

        for document in documents {
            let mut entry = match BufferEntry::from_document_data(&document.data) {
                Ok(entry) => entry,
                Err(e) => {
                    self.fail_malformed(&document, &e.to_string()).await;
                    continue;
                }
            };
            entry.claim(now)?;
            writes.push(DocumentWrite::Update {
                path: document.path.clone(),
                fields: entry.status_fields(),
                precondition: version_of(&document),
            });
            claimed.push(ClaimedEntry {
                path: document.path,
                entry,
            });
        }

        if writes.is_empty() {
            return Ok(claimed);
        }

        match self.store.commit(writes).await {
            Ok(()) => Ok(claimed),
            Err(StoreError::PreconditionFailed(reason)) => {
                warn!(
                    reason = %reason,
                    "Buffer entries were claimed by another run, skipping this batch"
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mark entries `completed` in one atomic write.
    pub async fn mark_completed(&self, entries: &mut [ClaimedEntry]) -> Result<(), SyncError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut writes = Vec::with_capacity(entries.len());
        for claimed in entries.iter_mut() {
            claimed.entry.complete()?;
            writes.push(status_update(claimed));
        }
        self.store.commit(writes).await?;
        Ok(())
    }

    /// Record a failed attempt: `failed` once the retry budget is spent,
    /// `retrying` with one more retry otherwise.
    ///
    /// # Returns
    ///
    /// * `Ok(BufferStatus)` - The status the entry was moved to
    /// * `Err(SyncError)` - If the entry isn't `processing` or the write fails
    pub async fn mark_failure_or_retry(
        &self,
        claimed: &mut ClaimedEntry,
        message: &str,
    ) -> Result<BufferStatus, SyncError> {
        let mut failures = [FailedEntry {
            claimed: claimed.clone(),
            message: message.to_string(),
        }];
        let statuses = self.mark_failures(&mut failures).await?;
        let [failure] = failures;
        *claimed = failure.claimed;
        Ok(statuses.first().copied().unwrap_or(BufferStatus::Failed))
    }

    /// Apply the retry rule to every failed entry and store the result in
    /// one atomic write.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<BufferStatus>)` - The new status of each entry, in order
    /// * `Err(SyncError)` - If an entry isn't `processing` or the write fails
    pub async fn mark_failures(
        &self,
        failures: &mut [FailedEntry],
    ) -> Result<Vec<BufferStatus>, SyncError> {
        if failures.is_empty() {
            return Ok(Vec::new());
        }
        let mut statuses = Vec::with_capacity(failures.len());
        let mut writes = Vec::with_capacity(failures.len());
        for failure in failures.iter_mut() {
            statuses.push(
                failure
                    .claimed
                    .entry
                    .record_failure(&failure.message, self.max_retries)?,
            );
            writes.push(status_update(&failure.claimed));
        }
        self.store.commit(writes).await?;

        for (failure, status) in failures.iter().zip(&statuses) {
            if *status == BufferStatus::Failed {
                error!(
                    document_id = %failure.claimed.entry.document_id,
                    retries = failure.claimed.entry.retries,
                    error = %failure.message,
                    "Buffer entry failed permanently"
                );
            }
        }
        Ok(statuses)
    }

    /// Requeue `processing` entries claimed more than `threshold` ago.
    ///
    /// Each counts as a failed attempt. Entries with no claim time are treated
    /// as stale.
    ///
    /// # Returns
    ///
    /// The number of entries moved out of `processing`.
    pub async fn requeue_stale(&self, threshold: Duration) -> Result<usize, SyncError> {
        let query = DocumentQuery::collection(&self.collection)
            .where_eq(FIELD_STATUS, BufferStatus::Processing.as_str());
        let documents = self.store.run_query(&query).await?;

        let cutoff = Utc::now().timestamp_millis() - threshold.as_millis() as i64;
        let mut writes = Vec::new();
        for document in documents {
            let Ok(mut entry) = BufferEntry::from_document_data(&document.data) else {
                continue;
            };
            if entry.claimed_at.is_some_and(|claimed_at| claimed_at > cutoff) {
                continue;
            }
            entry.record_failure(PROCESSING_TIMED_OUT, self.max_retries)?;
            writes.push(DocumentWrite::Update {
                path: document.path.clone(),
                fields: entry.status_fields(),
                precondition: version_of(&document),
            });
        }

        let requeued = writes.len();
        if requeued == 0 {
            return Ok(0);
        }
        match self.store.commit(writes).await {
            Ok(()) => {
                info!(count = requeued, "Requeued stale processing entries");
                Ok(requeued)
            }
            Err(StoreError::PreconditionFailed(reason)) => {
                warn!(reason = %reason, "Stale entries changed during requeue, skipping");
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fail_malformed(&self, document: &SourceDocument, reason: &str) {
        warn!(path = %document.path, reason = %reason, "Malformed buffer entry");
        let mut fields = DocumentData::new();
        fields.insert(FIELD_STATUS.to_string(), BufferStatus::Failed.as_str().into());
        fields.insert(FIELD_LAST_ERROR.to_string(), reason.into());
        let write = DocumentWrite::Update {
            path: document.path.clone(),
            fields,
            precondition: version_of(document),
        };
        if let Err(e) = self.store.commit(vec![write]).await {
            error!(path = %document.path, error = %e, "Failed to mark malformed buffer entry");
        }
    }
}

fn version_of(document: &SourceDocument) -> Option<Precondition> {
    document.version.clone().map(Precondition::UpdateTime)
}

fn status_update(claimed: &ClaimedEntry) -> DocumentWrite {
    DocumentWrite::Update {
        path: claimed.path.clone(),
        fields: claimed.entry.status_fields(),
        precondition: None,
    }
}
