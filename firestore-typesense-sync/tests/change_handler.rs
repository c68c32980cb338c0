//! Integration tests for change handling in direct and buffered mode.

mod common;

use std::sync::Arc;

use common::{config, data, MockSearchProvider};
use firestore_typesense_sync::{ChangeEvent, ChangeHandler, ChangeOutcome, Transformer};
use firestore_typesense_sync_repository::InMemoryDocumentStore;
use firestore_typesense_sync_shared::{BufferEntry, BufferOperation, BufferStatus};
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn handler(
    overrides: &[(&str, &str)],
    transformer: Transformer,
) -> (Arc<InMemoryDocumentStore>, Arc<MockSearchProvider>, ChangeHandler) {
    let store = Arc::new(InMemoryDocumentStore::new());
    let search = Arc::new(MockSearchProvider::new());
    let handler = ChangeHandler::new(&config(overrides), store.clone(), search.clone(), transformer);
    (store, search, handler)
}

#[tokio::test]
async fn test_create_upserts_projected_record() {
    let (store, search, handler) = handler(
        &[("FIRESTORE_COLLECTION_FIELDS", "author,title")],
        Transformer::disabled(),
    );
    let doc = data(json!({"author": "Author A", "title": "Title X", "country": "USA"}));
    store.insert("books/b1", doc.clone()).unwrap();

    let outcome = handler
        .handle(&ChangeEvent::created("books/b1", doc))
        .await
        .unwrap();

    assert_eq!(outcome, ChangeOutcome::Upserted("b1".to_string()));
    assert_eq!(
        search.get("b1").unwrap().into_json(),
        json!({"id": "b1", "author": "Author A", "title": "Title X"})
    );
}

#[tokio::test]
async fn test_update_reads_latest_version() {
    let (store, search, handler) = handler(&[], Transformer::disabled());
    store
        .insert("books/b1", data(json!({"title": "Newest"})))
        .unwrap();

    let event = ChangeEvent::updated(
        "books/b1",
        data(json!({"title": "Old"})),
        data(json!({"title": "Stale"})),
    );
    handler.handle(&event).await.unwrap();

    assert_eq!(search.get("b1").unwrap().get("title"), Some(&json!("Newest")));
}

#[tokio::test]
async fn test_subcollection_binds_parent_id() {
    let (store, search, handler) = handler(
        &[("FIRESTORE_COLLECTION_PATH", "users/{userId}/books")],
        Transformer::disabled(),
    );
    store
        .insert("users/u1/books/b1", data(json!({"title": "Dune"})))
        .unwrap();

    handler
        .handle(&ChangeEvent::created("users/u1/books/b1", Default::default()))
        .await
        .unwrap();

    assert_eq!(
        search.get("b1").unwrap().into_json(),
        json!({"id": "b1", "userId": "u1", "title": "Dune"})
    );
}

#[tokio::test]
async fn test_unwatched_path_is_skipped() {
    let (store, search, handler) = handler(&[], Transformer::disabled());
    store.insert("authors/a1", data(json!({"name": "x"}))).unwrap();

    let outcome = handler
        .handle(&ChangeEvent::created("authors/a1", Default::default()))
        .await
        .unwrap();

    assert_eq!(outcome, ChangeOutcome::Skipped);
    assert!(search.ids().is_empty());
}

#[tokio::test]
async fn test_vanished_document_is_skipped() {
    let (_, search, handler) = handler(&[], Transformer::disabled());

    let outcome = handler
        .handle(&ChangeEvent::created("books/gone", Default::default()))
        .await
        .unwrap();

    assert_eq!(outcome, ChangeOutcome::Skipped);
    assert!(search.ids().is_empty());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (_, search, handler) = handler(&[], Transformer::disabled());
    search.seed("b1");

    let event = ChangeEvent::deleted("books/b1", Default::default());
    assert_eq!(
        handler.handle(&event).await.unwrap(),
        ChangeOutcome::Deleted("b1".to_string())
    );
    assert_eq!(
        handler.handle(&event).await.unwrap(),
        ChangeOutcome::Deleted("b1".to_string())
    );
    assert!(search.ids().is_empty());
}

#[tokio::test]
async fn test_index_failure_is_returned() {
    let (store, search, handler) = handler(&[], Transformer::disabled());
    store.insert("books/b1", data(json!({"title": "x"}))).unwrap();
    search.set_unavailable(true);

    let result = handler
        .handle(&ChangeEvent::created("books/b1", Default::default()))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_buffered_mode_enqueues_instead_of_writing() {
    let (store, search, handler) = handler(
        &[
            ("FIRESTORE_COLLECTION_PATH", "users/{userId}/books"),
            ("TYPESENSE_USE_BUFFER", "true"),
        ],
        Transformer::disabled(),
    );
    store
        .insert("users/u1/books/b1", data(json!({"title": "Dune"})))
        .unwrap();

    let created = handler
        .handle(&ChangeEvent::created("users/u1/books/b1", Default::default()))
        .await
        .unwrap();
    let deleted = handler
        .handle(&ChangeEvent::deleted("users/u1/books/b2", Default::default()))
        .await
        .unwrap();

    assert_eq!(created, ChangeOutcome::Enqueued);
    assert_eq!(deleted, ChangeOutcome::Enqueued);
    assert!(search.ids().is_empty());

    let mut entries: Vec<BufferEntry> = store
        .list("typesense_buffer")
        .unwrap()
        .iter()
        .map(|d| BufferEntry::from_document_data(&d.data).unwrap())
        .collect();
    entries.sort_by(|a, b| a.document_id.cmp(&b.document_id));

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].document_id, "b1");
    assert_eq!(entries[0].operation, BufferOperation::Upsert);
    assert_eq!(entries[0].status, BufferStatus::Pending);
    assert_eq!(entries[0].retries, 0);
    assert_eq!(entries[0].path_params.get("userId").map(String::as_str), Some("u1"));
    assert_eq!(entries[0].document, Some(data(json!({"title": "Dune"}))));
    assert_eq!(entries[1].document_id, "b2");
    assert_eq!(entries[1].operation, BufferOperation::Delete);
    assert!(entries[1].document.is_none());
}

#[tokio::test]
async fn test_transformed_document_is_indexed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"title": "Dune", "rating": 5})),
        )
        .mount(&server)
        .await;

    let (store, search, handler) = handler(
        &[],
        Transformer::with_url(server.uri(), "enrich", Some("secret".to_string())),
    );
    store.insert("books/b1", data(json!({"title": "Dune"}))).unwrap();

    handler
        .handle(&ChangeEvent::created("books/b1", Default::default()))
        .await
        .unwrap();

    assert_eq!(
        search.get("b1").unwrap().into_json(),
        json!({"id": "b1", "title": "Dune", "rating": 5})
    );
}

#[tokio::test]
async fn test_upsert_with_full_record_logging() {
    let (store, search, handler) = handler(
        &[("LOG_TYPESENSE_INSERTS", "true")],
        Transformer::disabled(),
    );
    store.insert("books/b1", data(json!({"title": "Dune"}))).unwrap();

    let outcome = handler
        .handle(&ChangeEvent::created("books/b1", Default::default()))
        .await
        .unwrap();

    assert_eq!(outcome, ChangeOutcome::Upserted("b1".to_string()));
    assert_eq!(search.get("b1").unwrap().get("title"), Some(&json!("Dune")));
}
