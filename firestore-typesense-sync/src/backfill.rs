//! Full reconciliation of the index with the source collection.
//!
//! A backfill is armed by writing `trigger: true` to a control document. It
//! pages through every document of the watched collection (or collection
//! group) with a cursor and bulk-imports each page. Import failures are
//! logged and the scan continues; the operator re-runs it when needed.

use std::sync::Arc;

use firestore_typesense_sync_repository::{
    DocumentQuery, DocumentStore, ImportAction, ImportSummary, SearchIndexProvider,
};
use firestore_typesense_sync_shared::{
    DocumentData, DocumentValue, IndexableRecord, PathError, PathPattern,
};
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::projector::DocumentProjector;

const TRIGGER_FIELD: &str = "trigger";
const COLLECTIONS_FIELD: &str = "firestore_collections";

/// Counts from one backfill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub pages: usize,
    /// Documents read from the store.
    pub fetched: usize,
    /// Documents of a sibling collection left out in group mode.
    pub skipped: usize,
    pub imported: usize,
    pub failed: usize,
}

/// Result of handling the control document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// The document did not arm a backfill for this collection.
    Skipped(String),
    Completed(BackfillSummary),
}

/// Pages through the source collection and imports it into the index.
pub struct BackfillRunner {
    pattern: PathPattern,
    projector: DocumentProjector,
    store: Arc<dyn DocumentStore>,
    search: Arc<dyn SearchIndexProvider>,
    batch_size: usize,
    trigger_document: String,
    log_inserts: bool,
}

impl BackfillRunner {
    pub fn new(
        config: &SyncConfig,
        store: Arc<dyn DocumentStore>,
        search: Arc<dyn SearchIndexProvider>,
    ) -> Self {
        Self {
            pattern: config.collection_path.clone(),
            projector: DocumentProjector::from_config(config),
            store,
            search,
            batch_size: config.backfill.batch_size.max(1),
            trigger_document: config.backfill.trigger_document.clone(),
            log_inserts: config.log_inserts,
        }
    }

    pub fn trigger_document(&self) -> &str {
        &self.trigger_document
    }

    /// Check whether control document data arms a backfill of this collection.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - `trigger` is `true` (or `"true"`) and, when present,
    ///   `firestore_collections` lists the watched path
    /// * `Err(String)` - Why the backfill is skipped
    pub fn validate_trigger(&self, data: &DocumentData) -> Result<(), String> {
        let armed = match data.get(TRIGGER_FIELD) {
            Some(DocumentValue::Boolean(true)) => true,
            Some(DocumentValue::String(s)) => s == "true",
            _ => false,
        };
        if !armed {
            return Err(format!(
                "Skipping backfill. `trigger: true` key was not found in Firestore document {}.",
                self.trigger_document
            ));
        }

        if let Some(DocumentValue::Array(collections)) = data.get(COLLECTIONS_FIELD) {
            let listed = collections
                .iter()
                .any(|c| c.as_str() == Some(self.pattern.as_str()));
            if !listed {
                return Err(format!(
                    "Skipping backfill. The `{}` key in {} did not contain collection {}.",
                    COLLECTIONS_FIELD,
                    self.trigger_document,
                    self.pattern.as_str()
                ));
            }
        }
        Ok(())
    }

    /// React to a write of the control document.
    ///
    /// `None` (the document was deleted) never arms a backfill.
    pub async fn handle_trigger(
        &self,
        data: Option<&DocumentData>,
    ) -> Result<BackfillOutcome, SyncError> {
        let Some(data) = data else {
            let reason = format!("Trigger document {} was deleted.", self.trigger_document);
            debug!("{}", reason);
            return Ok(BackfillOutcome::Skipped(reason));
        };
        if let Err(reason) = self.validate_trigger(data) {
            error!("{}", reason);
            return Ok(BackfillOutcome::Skipped(reason));
        }
        Ok(BackfillOutcome::Completed(self.run().await?))
    }

    /// Read the control document and backfill when it is armed.
    pub async fn run_from_trigger_document(&self) -> Result<BackfillOutcome, SyncError> {
        let snapshot = self.store.get_document(&self.trigger_document).await?;
        self.handle_trigger(snapshot.as_ref().map(|s| &s.data)).await
    }

    /// Backfill unconditionally.
    ///
    /// # Returns
    ///
    /// * `Ok(BackfillSummary)` - Counts over all pages; import failures are
    ///   counted, not returned
    /// * `Err(SyncError)` - If reading the store fails
    #[instrument(skip(self), fields(collection = %self.pattern))]
    pub async fn run(&self) -> Result<BackfillSummary, SyncError> {
        info!(
            "Backfilling {} fields in Firestore documents from {}",
            self.projector.selector().paths().collect::<Vec<_>>().join(","),
            self.pattern
        );

        let group_mode = self.pattern.is_collection_group();
        let base_query = if group_mode {
            let collection_id = self.pattern.last_literal().ok_or_else(|| {
                PathError::InvalidPattern(format!(
                    "{} must end with a collection id",
                    self.pattern
                ))
            })?;
            DocumentQuery::collection_group(collection_id)
        } else {
            DocumentQuery::collection(self.pattern.as_str())
        };

        let mut summary = BackfillSummary::default();
        let mut cursor = None;
        loop {
            let mut query = base_query.clone().limit(self.batch_size);
            if let Some(last) = cursor.take() {
                query = query.start_after(last);
            }
            let page = self.store.run_query(&query).await?;
            if page.is_empty() {
                break;
            }
            summary.pages += 1;
            summary.fetched += page.len();
            let last_page = page.len() < self.batch_size;

            let records: Vec<IndexableRecord> = page
                .iter()
                .filter_map(|document| {
                    let params = if group_mode {
                        self.pattern.matches_document(&document.path)?
                    } else {
                        self.pattern.matches_document(&document.path).unwrap_or_default()
                    };
                    let record = self.projector.project_snapshot(document, &params);
                    if self.log_inserts {
                        let document = Value::Object(record.fields().clone());
                        debug!("Backfilling document {}", document);
                    }
                    Some(record)
                })
                .collect();
            summary.skipped += page.len() - records.len();
            cursor = page.into_iter().last();

            if !records.is_empty() {
                self.import_page(&records, &mut summary).await;
            }
            if last_page {
                break;
            }
            tokio::task::yield_now().await;
        }

        info!(
            imported = summary.imported,
            failed = summary.failed,
            skipped = summary.skipped,
            "Done backfilling to Typesense from Firestore"
        );
        Ok(summary)
    }

    async fn import_page(&self, records: &[IndexableRecord], summary: &mut BackfillSummary) {
        let first = records.first().map(IndexableRecord::id).unwrap_or_default();
        let last = records.last().map(IndexableRecord::id).unwrap_or_default();

        match self
            .search
            .import_documents(records, ImportAction::Upsert)
            .await
        {
            Ok(result) if result.is_success() => {
                summary.imported += result.succeeded;
                info!("Imported {} documents into Typesense", result.succeeded);
            }
            Ok(result) => {
                summary.imported += result.succeeded;
                summary.failed += result.failed;
                error!(
                    "Import error in a batch of documents from {} to {}",
                    first, last
                );
                log_import_errors(&result);
            }
            Err(e) => {
                summary.failed += records.len();
                error!(
                    error = %e,
                    "Import error in a batch of documents from {} to {}",
                    first, last
                );
            }
        }
    }
}

fn log_import_errors(result: &ImportSummary) {
    for failure in result.failures() {
        error!(
            document_id = %failure.id,
            document = failure.document.as_deref().unwrap_or_default(),
            "Error importing document with error: {}",
            failure.error.as_deref().unwrap_or("unknown")
        );
    }
}

