//! Reaction to a single document change notification.

use std::sync::Arc;

use chrono::Utc;
use firestore_typesense_sync_repository::{DocumentStore, SearchIndexProvider};
use firestore_typesense_sync_shared::{
    normalize_path, BufferEntry, DocumentData, PathBinding, PathPattern, SourceDocument,
};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::buffer::Buffer;
use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::projector::DocumentProjector;
use crate::transformer::Transformer;

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A write notification for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub path: String,
    pub before: Option<DocumentData>,
    pub after: Option<DocumentData>,
}

impl ChangeEvent {
    pub fn created(path: impl Into<String>, after: DocumentData) -> Self {
        Self {
            path: path.into(),
            before: None,
            after: Some(after),
        }
    }

    pub fn updated(path: impl Into<String>, before: DocumentData, after: DocumentData) -> Self {
        Self {
            path: path.into(),
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn deleted(path: impl Into<String>, before: DocumentData) -> Self {
        Self {
            path: path.into(),
            before: Some(before),
            after: None,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (_, None) => ChangeKind::Deleted,
            (None, Some(_)) => ChangeKind::Created,
            (Some(_), Some(_)) => ChangeKind::Updated,
        }
    }
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// A buffer entry was written.
    Enqueued,
    /// The record with this id was written to the index.
    Upserted(String),
    /// The record with this id was removed from the index.
    Deleted(String),
    /// The path isn't watched, or the document no longer exists.
    Skipped,
}

/// Applies change events to the index, directly or through the buffer.
pub struct ChangeHandler {
    pattern: PathPattern,
    projector: DocumentProjector,
    transformer: Transformer,
    store: Arc<dyn DocumentStore>,
    search: Arc<dyn SearchIndexProvider>,
    /// Set in buffered mode.
    buffer: Option<Buffer>,
    log_inserts: bool,
}

impl ChangeHandler {
    pub fn new(
        config: &SyncConfig,
        store: Arc<dyn DocumentStore>,
        search: Arc<dyn SearchIndexProvider>,
        transformer: Transformer,
    ) -> Self {
        let buffer = config.buffer.enabled.then(|| {
            Buffer::new(
                store.clone(),
                config.buffer.collection_path.clone(),
                config.buffer.max_retries,
            )
        });
        Self {
            pattern: config.collection_path.clone(),
            projector: DocumentProjector::from_config(config),
            transformer,
            store,
            search,
            buffer,
            log_inserts: config.log_inserts,
        }
    }

    /// Handle one change event.
    ///
    /// Creates and updates re-read the document so the latest committed
    /// version is indexed, whatever the event carried. Exactly one buffer
    /// write or one index write happens per call.
    ///
    /// # Returns
    ///
    /// * `Ok(ChangeOutcome)` - What was done
    /// * `Err(SyncError)` - If the store, buffer or index call fails
    #[instrument(skip(self, event), fields(path = %event.path, kind = ?event.kind()))]
    pub async fn handle(&self, event: &ChangeEvent) -> Result<ChangeOutcome, SyncError> {
        let path = normalize_path(&event.path);
        let Some(params) = self.pattern.matches_document(&path) else {
            debug!("Path does not match the watched collection, skipping");
            return Ok(ChangeOutcome::Skipped);
        };
        let document_id = path.rsplit('/').next().unwrap_or_default().to_string();

        if event.kind() == ChangeKind::Deleted {
            return match self.buffer {
                Some(ref buffer) => {
                    let entry = BufferEntry::delete(&document_id, params, now_millis());
                    buffer.enqueue(&entry).await?;
                    Ok(ChangeOutcome::Enqueued)
                }
                None => {
                    info!("Deleting document {}", document_id);
                    self.search.delete_document(&document_id).await?;
                    Ok(ChangeOutcome::Deleted(document_id))
                }
            };
        }

        let Some(snapshot) = self.store.get_document(&path).await? else {
            warn!("Document no longer exists, skipping");
            return Ok(ChangeOutcome::Skipped);
        };
        let data = self.transformer.transform_document(&snapshot).await;

        match self.buffer {
            Some(ref buffer) => {
                let entry = BufferEntry::upsert(&snapshot.id, data, params, now_millis());
                buffer.enqueue(&entry).await?;
                Ok(ChangeOutcome::Enqueued)
            }
            None => self.upsert(&snapshot, &data, &params).await,
        }
    }

    async fn upsert(
        &self,
        snapshot: &SourceDocument,
        data: &DocumentData,
        params: &PathBinding,
    ) -> Result<ChangeOutcome, SyncError> {
        let record = self.projector.project(&snapshot.id, data, params);
        if self.log_inserts {
            let document = Value::Object(record.fields().clone());
            debug!("Upserting document {}", document);
        } else {
            info!("Upserting document {}", record.id());
        }
        self.search.upsert_document(&record).await?;
        Ok(ChangeOutcome::Upserted(record.id().to_string()))
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
