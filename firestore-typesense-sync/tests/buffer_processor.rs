//! Integration tests for the buffer drain.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{config, data, FlakyStore, MockSearchProvider};
use firestore_typesense_sync::buffer::{MISSING_FROM_INDEX, MISSING_PAYLOAD};
use firestore_typesense_sync::{BufferProcessor, DrainSummary};
use firestore_typesense_sync_repository::InMemoryDocumentStore;
use firestore_typesense_sync_shared::{BufferEntry, BufferStatus, DocumentValue, PathBinding};
use serde_json::json;
use tokio::time::timeout;

struct Fixture {
    store: Arc<InMemoryDocumentStore>,
    search: Arc<MockSearchProvider>,
    processor: BufferProcessor,
}

fn fixture(overrides: &[(&str, &str)]) -> Fixture {
    let mut vars = vec![("TYPESENSE_USE_BUFFER", "true")];
    vars.extend_from_slice(overrides);
    let store = Arc::new(InMemoryDocumentStore::new());
    let search = Arc::new(MockSearchProvider::new());
    let processor = BufferProcessor::new(&config(&vars), store.clone(), search.clone());
    Fixture {
        store,
        search,
        processor,
    }
}

impl Fixture {
    async fn upsert(&self, id: &str, timestamp: i64) {
        let entry = BufferEntry::upsert(
            id,
            data(json!({"title": format!("Title {}", id)})),
            PathBinding::new(),
            timestamp,
        );
        self.processor.buffer().enqueue(&entry).await.unwrap();
    }

    async fn delete(&self, id: &str, timestamp: i64) {
        let entry = BufferEntry::delete(id, PathBinding::new(), timestamp);
        self.processor.buffer().enqueue(&entry).await.unwrap();
    }

    fn entries(&self) -> Vec<BufferEntry> {
        let mut entries: Vec<BufferEntry> = self
            .store
            .list("typesense_buffer")
            .unwrap()
            .iter()
            .map(|d| BufferEntry::from_document_data(&d.data).unwrap())
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        entries
    }

    fn entry(&self, id: &str) -> BufferEntry {
        self.entries()
            .into_iter()
            .find(|e| e.document_id == id)
            .unwrap()
    }
}

#[tokio::test]
async fn test_empty_buffer() {
    let f = fixture(&[]);
    assert_eq!(f.processor.run_once().await.unwrap(), DrainSummary::default());
    assert_eq!(f.search.import_count(), 0);
}

#[tokio::test]
async fn test_partial_import_failure() {
    let f = fixture(&[]);
    f.upsert("a", 1).await;
    f.upsert("b", 2).await;
    f.upsert("c", 3).await;
    f.search.reject("b");

    let summary = f.processor.run_once().await.unwrap();

    assert_eq!(summary.claimed, 3);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.retrying, 1);
    assert_eq!(f.search.import_count(), 1);
    assert_eq!(f.search.ids(), vec!["a", "c"]);
    assert_eq!(f.entry("a").status, BufferStatus::Completed);
    assert_eq!(f.entry("c").status, BufferStatus::Completed);

    let failed = f.entry("b");
    assert_eq!(failed.status, BufferStatus::Retrying);
    assert_eq!(failed.retries, 1);
    assert_eq!(failed.last_error.as_deref(), Some("Field `year` must be an int32."));
}

#[tokio::test]
async fn test_no_entry_left_processing() {
    let f = fixture(&[]);
    f.upsert("a", 1).await;
    f.delete("missing", 2).await;
    f.search.reject("a");

    f.processor.run_once().await.unwrap();

    assert!(f
        .entries()
        .iter()
        .all(|e| e.status != BufferStatus::Processing));
}

#[tokio::test]
async fn test_total_import_failure_retries_every_entry() {
    let f = fixture(&[]);
    f.upsert("a", 1).await;
    f.upsert("b", 2).await;
    f.search.set_unavailable(true);

    let summary = f.processor.run_once().await.unwrap();

    assert_eq!(summary.retrying, 2);
    for entry in f.entries() {
        assert_eq!(entry.status, BufferStatus::Retrying);
        assert!(entry
            .last_error
            .unwrap()
            .starts_with("Error upserting documents: "));
    }
}

#[tokio::test]
async fn test_entry_fails_after_max_retries() {
    let f = fixture(&[("TYPESENSE_BUFFER_MAX_RETRIES", "2")]);
    f.upsert("a", 1).await;
    f.search.reject("a");

    for _ in 0..2 {
        f.processor.run_once().await.unwrap();
        assert_eq!(f.entry("a").status, BufferStatus::Retrying);
    }
    let summary = f.processor.run_once().await.unwrap();
    assert_eq!(summary.failed, 1);

    let entry = f.entry("a");
    assert_eq!(entry.status, BufferStatus::Failed);
    assert_eq!(entry.retries, 2);

    assert_eq!(f.processor.run_once().await.unwrap().claimed, 0);
}

#[tokio::test]
async fn test_retrying_entry_succeeds_later() {
    let f = fixture(&[]);
    f.upsert("a", 1).await;
    f.search.set_unavailable(true);
    f.processor.run_once().await.unwrap();

    f.search.set_unavailable(false);
    let summary = f.processor.run_once().await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(f.entry("a").status, BufferStatus::Completed);
    assert_eq!(f.search.ids(), vec!["a"]);
}

#[tokio::test]
async fn test_deletes_missing_from_index() {
    let f = fixture(&[]);
    f.search.seed("present");
    f.delete("present", 1).await;
    f.delete("absent", 2).await;

    let summary = f.processor.run_once().await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.retrying, 1);
    assert_eq!(f.entry("present").status, BufferStatus::Completed);
    let absent = f.entry("absent");
    assert_eq!(absent.status, BufferStatus::Retrying);
    assert_eq!(absent.last_error.as_deref(), Some(MISSING_FROM_INDEX));
    assert!(f.search.ids().is_empty());
}

#[tokio::test]
async fn test_newest_entry_per_document_wins() {
    let f = fixture(&[]);
    f.search.seed("a");
    f.upsert("a", 1).await;
    f.delete("a", 2).await;

    let summary = f.processor.run_once().await.unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(f.search.import_count(), 0);
    assert!(f.search.ids().is_empty());
    assert!(f
        .entries()
        .iter()
        .all(|e| e.status == BufferStatus::Completed));
}

#[tokio::test]
async fn test_upsert_without_payload_fails() {
    let f = fixture(&[]);
    let mut entry = BufferEntry::upsert("a", Default::default(), PathBinding::new(), 1).to_document_data();
    entry.remove("document");
    f.store.insert("typesense_buffer/a", entry).unwrap();

    let summary = f.processor.run_once().await.unwrap();

    assert_eq!(summary.retrying, 1);
    assert_eq!(f.entry("a").last_error.as_deref(), Some(MISSING_PAYLOAD));
}

#[tokio::test]
async fn test_batch_size_bounds_each_run() {
    let f = fixture(&[("TYPESENSE_BUFFER_BATCH_SIZE", "2")]);
    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        f.upsert(id, i as i64).await;
    }

    assert_eq!(f.processor.run_once().await.unwrap().claimed, 2);
    assert_eq!(f.search.ids(), vec!["a", "b"]);
    assert_eq!(f.processor.run_once().await.unwrap().claimed, 1);
    assert_eq!(f.search.ids(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_projection_uses_path_params() {
    let f = fixture(&[("FIRESTORE_COLLECTION_PATH", "users/{userId}/books")]);
    let mut params = PathBinding::new();
    params.insert("userId".to_string(), "u1".to_string());
    let entry = BufferEntry::upsert("b1", data(json!({"title": "Dune"})), params, 1);
    f.processor.buffer().enqueue(&entry).await.unwrap();

    f.processor.run_once().await.unwrap();

    assert_eq!(
        f.search.get("b1").unwrap().into_json(),
        json!({"id": "b1", "userId": "u1", "title": "Dune"})
    );
}

#[tokio::test]
async fn test_stale_processing_entry_is_requeued() {
    let f = fixture(&[("TYPESENSE_BUFFER_STALE_PROCESSING_MINUTES", "5")]);
    let mut stuck = BufferEntry::upsert("a", data(json!({"title": "x"})), PathBinding::new(), 1);
    stuck.claim(0).unwrap();
    f.store
        .insert("typesense_buffer/stuck", stuck.to_document_data())
        .unwrap();

    let summary = f.processor.run_once().await.unwrap();

    assert_eq!(summary.requeued, 1);
    assert_eq!(summary.completed, 1);
    let entry = f.entry("a");
    assert_eq!(entry.status, BufferStatus::Completed);
    assert_eq!(entry.retries, 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let f = fixture(&[("TYPESENSE_BUFFER_FLUSH_INTERVAL", "1")]);
    f.upsert("a", 1).await;

    let result = timeout(
        Duration::from_secs(5),
        f.processor.run(tokio::time::sleep(Duration::from_millis(200))),
    )
    .await;

    assert!(matches!(result, Ok(Ok(()))));
    assert_eq!(
        f.store
            .list("typesense_buffer")
            .unwrap()
            .first()
            .and_then(|d| d.get("status").cloned()),
        Some(DocumentValue::from("completed"))
    );
}

struct FlakyFixture {
    store: Arc<FlakyStore>,
    search: Arc<MockSearchProvider>,
    processor: BufferProcessor,
}

/// Four claimed upserts, `b` and `c` rejected by the index.
async fn mixed_outcome_fixture() -> FlakyFixture {
    let store = Arc::new(FlakyStore::new());
    let search = Arc::new(MockSearchProvider::new());
    let processor = BufferProcessor::new(
        &config(&[("TYPESENSE_USE_BUFFER", "true")]),
        store.clone(),
        search.clone(),
    );
    for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
        let entry = BufferEntry::upsert(
            *id,
            data(json!({"title": id})),
            PathBinding::new(),
            i as i64,
        );
        processor.buffer().enqueue(&entry).await.unwrap();
    }
    search.reject("b");
    search.reject("c");
    FlakyFixture {
        store,
        search,
        processor,
    }
}

fn statuses(store: &FlakyStore) -> Vec<(String, BufferStatus)> {
    let mut statuses: Vec<(String, BufferStatus)> = store
        .inner
        .list("typesense_buffer")
        .unwrap()
        .iter()
        .map(|d| BufferEntry::from_document_data(&d.data).unwrap())
        .map(|e| (e.document_id, e.status))
        .collect();
    statuses.sort_by(|a, b| a.0.cmp(&b.0));
    statuses
}

#[tokio::test]
async fn test_outcomes_are_written_once_per_class() {
    let f = mixed_outcome_fixture().await;

    let summary = f.processor.run_once().await.unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.retrying, 2);
    // claim, completions, failures
    assert_eq!(f.store.commit_count(), 3);
    assert_eq!(f.search.ids(), vec!["a", "d"]);
}

#[tokio::test]
async fn test_failure_write_error_still_completes_indexed_entries() {
    let f = mixed_outcome_fixture().await;
    f.store.fail_commit(3);

    let result = f.processor.run_once().await;

    assert!(result.is_err());
    let statuses = statuses(&f.store);
    assert_eq!(statuses[0], ("a".to_string(), BufferStatus::Completed));
    assert_eq!(statuses[3], ("d".to_string(), BufferStatus::Completed));
}

#[tokio::test]
async fn test_completion_write_error_still_records_failures() {
    let f = mixed_outcome_fixture().await;
    f.store.fail_commit(2);

    let result = f.processor.run_once().await;

    assert!(result.is_err());
    let statuses = statuses(&f.store);
    assert_eq!(statuses[1], ("b".to_string(), BufferStatus::Retrying));
    assert_eq!(statuses[2], ("c".to_string(), BufferStatus::Retrying));
}
