//! Scheduled drain of the buffer into the search index.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use firestore_typesense_sync_repository::{DocumentStore, ImportAction, SearchIndexProvider};
use firestore_typesense_sync_shared::{BufferOperation, BufferStatus};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::buffer::{Buffer, ClaimedEntry, FailedEntry};
use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::projector::DocumentProjector;

/// Error recorded on upserts whose entry carries no document.
pub const MISSING_PAYLOAD: &str = "Missing document payload for upsert";
/// Error recorded on deletes the index did not find.
pub const MISSING_FROM_INDEX: &str = "Missing from Typesense";

/// Counts from one drain run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub claimed: usize,
    pub completed: usize,
    pub retrying: usize,
    pub failed: usize,
    /// Stale `processing` entries moved back before claiming.
    pub requeued: usize,
}

/// Entries for the same document claimed in one run.
///
/// The newest entry decides the operation; older ones share its outcome.
struct DocumentGroup {
    document_id: String,
    entries: Vec<ClaimedEntry>,
}

impl DocumentGroup {
    fn newest(&self) -> Option<&ClaimedEntry> {
        self.entries.iter().max_by_key(|claimed| claimed.entry.timestamp)
    }
}

/// Drains the buffer in bounded batches.
pub struct BufferProcessor {
    buffer: Buffer,
    search: Arc<dyn SearchIndexProvider>,
    projector: DocumentProjector,
    batch_size: usize,
    stale_after: Option<Duration>,
    flush_interval: Duration,
}

impl BufferProcessor {
    pub fn new(
        config: &SyncConfig,
        store: Arc<dyn DocumentStore>,
        search: Arc<dyn SearchIndexProvider>,
    ) -> Self {
        Self {
            buffer: Buffer::new(
                store,
                config.buffer.collection_path.clone(),
                config.buffer.max_retries,
            ),
            search,
            projector: DocumentProjector::from_config(config),
            batch_size: config.buffer.batch_size,
            stale_after: config.buffer.stale_processing_after,
            flush_interval: config.buffer.flush_interval,
        }
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Run one drain.
    ///
    /// Every claimed entry ends the run `completed`, `retrying` or `failed`.
    ///
    /// # Returns
    ///
    /// * `Ok(DrainSummary)` - What happened to the claimed entries
    /// * `Err(SyncError)` - If the buffer could not be read or written
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<DrainSummary, SyncError> {
        info!("Processing buffer");
        let mut summary = DrainSummary::default();

        if let Some(threshold) = self.stale_after {
            summary.requeued = self.buffer.requeue_stale(threshold).await?;
        }

        let claimed = self.buffer.claim_batch(self.batch_size).await?;
        if claimed.is_empty() {
            info!("No documents to process");
            return Ok(summary);
        }
        summary.claimed = claimed.len();
        info!("Processing {} documents", claimed.len());

        let mut upserts = Vec::new();
        let mut deletes = Vec::new();
        for group in group_by_document(claimed) {
            match group.newest().map(|newest| newest.entry.operation) {
                Some(BufferOperation::Upsert) => upserts.push(group),
                Some(BufferOperation::Delete) => deletes.push(group),
                None => {}
            }
        }

        let mut completed = Vec::new();
        let mut failures = Vec::new();
        self.apply_upserts(upserts, &mut completed, &mut failures).await;
        self.apply_deletes(deletes, &mut completed, &mut failures).await;

        let mut completed: Vec<ClaimedEntry> =
            completed.into_iter().flat_map(|group| group.entries).collect();
        let mut failed: Vec<FailedEntry> = failures
            .into_iter()
            .flat_map(|(group, message)| {
                group.entries.into_iter().map(move |claimed| FailedEntry {
                    claimed,
                    message: message.clone(),
                })
            })
            .collect();

        // Both writes run even when the other one fails.
        let completion = self.buffer.mark_completed(&mut completed).await;
        let marking = self.buffer.mark_failures(&mut failed).await;
        let statuses = match (completion, marking) {
            (Ok(()), Ok(statuses)) => statuses,
            (Err(e), Ok(_)) | (Ok(()), Err(e)) => return Err(e),
            (Err(e), Err(other)) => {
                error!(error = %other, "Failed to record failed buffer entries");
                return Err(e);
            }
        };
        summary.completed = completed.len();
        for status in statuses {
            match status {
                BufferStatus::Failed => summary.failed += 1,
                _ => summary.retrying += 1,
            }
        }

        info!(
            completed = summary.completed,
            retrying = summary.retrying,
            failed = summary.failed,
            "Completed processing {} documents",
            summary.claimed
        );
        Ok(summary)
    }

    async fn apply_upserts(
        &self,
        groups: Vec<DocumentGroup>,
        completed: &mut Vec<DocumentGroup>,
        failures: &mut Vec<(DocumentGroup, String)>,
    ) {
        let mut records = Vec::with_capacity(groups.len());
        let mut submitted = Vec::with_capacity(groups.len());
        for group in groups {
            let record = group.newest().and_then(|newest| {
                newest.entry.document.as_ref().map(|document| {
                    self.projector
                        .project(&group.document_id, document, &newest.entry.path_params)
                })
            });
            match record {
                Some(record) => {
                    records.push(record);
                    submitted.push(group);
                }
                None => {
                    warn!(document_id = %group.document_id, "{}", MISSING_PAYLOAD);
                    failures.push((group, MISSING_PAYLOAD.to_string()));
                }
            }
        }
        if records.is_empty() {
            return;
        }

        match self
            .search
            .import_documents(&records, ImportAction::Upsert)
            .await
        {
            Ok(result) => {
                if !result.is_success() {
                    warn!(
                        failed = result.failed,
                        total = result.total,
                        "Some documents failed to upsert"
                    );
                }
                let mut items = result.results.into_iter();
                for group in submitted {
                    match items.next() {
                        Some(item) if item.success => completed.push(group),
                        Some(item) => {
                            let message = item
                                .error
                                .unwrap_or_else(|| "Unknown import error".to_string());
                            debug!(document_id = %item.id, error = %message, "Upsert failed");
                            failures.push((group, message));
                        }
                        None => failures.push((group, "Missing import result".to_string())),
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Error upserting documents");
                let message = format!("Error upserting documents: {}", e);
                failures.extend(submitted.into_iter().map(|group| (group, message.clone())));
            }
        }
    }

    async fn apply_deletes(
        &self,
        groups: Vec<DocumentGroup>,
        completed: &mut Vec<DocumentGroup>,
        failures: &mut Vec<(DocumentGroup, String)>,
    ) {
        if groups.is_empty() {
            return;
        }
        let ids: Vec<String> = groups.iter().map(|g| g.document_id.clone()).collect();

        match self.search.delete_documents_by_ids(&ids).await {
            Ok(result) => {
                let missing = result.missing(&ids);
                if !missing.is_empty() {
                    warn!(
                        "Missing {} documents from delete batch: {}",
                        missing.len(),
                        missing.join(", ")
                    );
                }
                for group in groups {
                    if missing.contains(&group.document_id.as_str()) {
                        failures.push((group, MISSING_FROM_INDEX.to_string()));
                    } else {
                        completed.push(group);
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Error deleting documents");
                let message = format!("Error deleting documents: {}", e);
                failures.extend(groups.into_iter().map(|group| (group, message.clone())));
            }
        }
    }

    /// Drain on every tick of the flush interval until `shutdown` resolves.
    ///
    /// A failed run is logged and the loop continues.
    #[instrument(skip(self, shutdown))]
    pub async fn run<F>(&self, shutdown: F) -> Result<(), SyncError>
    where
        F: Future<Output = ()>,
    {
        info!(
            interval_secs = self.flush_interval.as_secs(),
            "Starting buffer processor"
        );
        let mut ticker = interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut total = DrainSummary::default();
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(summary) => {
                            total.claimed += summary.claimed;
                            total.completed += summary.completed;
                            total.retrying += summary.retrying;
                            total.failed += summary.failed;
                            total.requeued += summary.requeued;
                        }
                        Err(e) => error!(error = %e, "Buffer processing failed"),
                    }
                }
            }
        }

        info!(
            claimed = total.claimed,
            completed = total.completed,
            retrying = total.retrying,
            failed = total.failed,
            "Buffer processor stopped"
        );
        Ok(())
    }
}

/// Group claimed entries by document id, keeping first-claimed order.
fn group_by_document(claimed: Vec<ClaimedEntry>) -> Vec<DocumentGroup> {
    let mut order = Vec::new();
    let mut groups: BTreeMap<String, Vec<ClaimedEntry>> = BTreeMap::new();
    for entry in claimed {
        let id = entry.entry.document_id.clone();
        if !groups.contains_key(&id) {
            order.push(id.clone());
        }
        groups.entry(id).or_default().push(entry);
    }
    order
        .into_iter()
        .filter_map(|document_id| {
            groups.remove(&document_id).map(|entries| DocumentGroup {
                document_id,
                entries,
            })
        })
        .collect()
}
