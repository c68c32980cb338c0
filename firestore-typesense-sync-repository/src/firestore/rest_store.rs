//! Firestore REST implementation of the document store.
//!
//! Talks to the Firestore v1 REST API, or to a local emulator when
//! `FirestoreConfig::emulator_host` is set.

use async_trait::async_trait;
use firestore_typesense_sync_shared::{parent_path, DocumentData, SourceDocument};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::FirestoreConfig;
use crate::errors::StoreError;
use crate::firestore::value_codec::ValueCodec;
use crate::interfaces::DocumentStore;
use crate::types::{DocumentQuery, DocumentWrite, FilterOp, Precondition, QuerySource};
use crate::utils::lookup_field;

const DOCUMENT_NAME_FIELD: &str = "__name__";
/// Token the emulator accepts as an administrator.
const EMULATOR_TOKEN: &str = "owner";

/// Document store backed by the Firestore REST API.
pub struct FirestoreRestStore {
    client: Client,
    endpoint: String,
    codec: ValueCodec,
    documents_root: String,
    access_token: Option<String>,
}

impl FirestoreRestStore {
    /// Create a store from connection settings.
    ///
    /// # Returns
    ///
    /// * `Ok(FirestoreRestStore)` - A new store instance
    /// * `Err(StoreError)` - If the HTTP client cannot be built
    pub fn new(config: &FirestoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .build()
            .map_err(|e| StoreError::connection(e.to_string()))?;

        let access_token = match (&config.access_token, &config.emulator_host) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(_)) => Some(EMULATOR_TOKEN.to_string()),
            (None, None) => None,
        };
        let documents_root = config.documents_root();

        info!(
            endpoint = %config.endpoint(),
            project = %config.project_id,
            database = %config.database_id,
            "Created Firestore store"
        );

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            codec: ValueCodec::new(documents_root.clone()),
            documents_root,
            access_token,
        })
    }

    /// URL of a resource under the documents root, with an optional
    /// `:method` suffix.
    fn url(&self, path: &str, method: Option<&str>) -> String {
        let path = path.trim_matches('/');
        let mut url = format!("{}/v1/{}", self.endpoint, self.documents_root);
        if !path.is_empty() {
            url.push('/');
            url.push_str(path);
        }
        if let Some(method) = method {
            url.push(':');
            url.push_str(method);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.access_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let error = body.get("error");
        let message = error
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let code = error
            .and_then(|e| e.get("status"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        Err(match (status, code) {
            (_, "FAILED_PRECONDITION") | (_, "ABORTED") | (StatusCode::CONFLICT, _) => {
                StoreError::precondition_failed(message)
            }
            (StatusCode::NOT_FOUND, _) => StoreError::not_found(message),
            _ => StoreError::http_status(status.as_u16(), message),
        })
    }

    fn parse_document(&self, document: &Value) -> Result<SourceDocument, StoreError> {
        let name = document
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::codec("Document without a name"))?;
        let data = self.codec.decode_fields(document.get("fields"))?;

        let snapshot = SourceDocument::new(self.codec.relative_path(name), data);
        Ok(match document.get("updateTime").and_then(Value::as_str) {
            Some(update_time) => snapshot.with_version(update_time),
            None => snapshot,
        })
    }

    fn precondition_json(precondition: &Precondition) -> Value {
        match precondition {
            Precondition::Exists(exists) => json!({"exists": exists}),
            Precondition::UpdateTime(version) => json!({"updateTime": version}),
        }
    }

    fn write_json(&self, write: &DocumentWrite) -> Value {
        let mut body = match write {
            DocumentWrite::Set { path, data, .. } => json!({
                "update": {
                    "name": self.codec.document_name(path),
                    "fields": self.codec.encode_fields(data),
                }
            }),
            DocumentWrite::Update { path, fields, .. } => json!({
                "update": {
                    "name": self.codec.document_name(path),
                    "fields": self.codec.encode_fields(fields),
                },
                "updateMask": {
                    "fieldPaths": fields.keys().map(|k| quote_field_path(k)).collect::<Vec<_>>(),
                },
                "currentDocument": {"exists": true},
            }),
            DocumentWrite::Delete { path, .. } => json!({
                "delete": self.codec.document_name(path),
            }),
        };

        if let (Some(precondition), Some(object)) = (write.precondition(), body.as_object_mut()) {
            object.insert(
                "currentDocument".to_string(),
                Self::precondition_json(precondition),
            );
        }
        body
    }

    fn structured_query(&self, query: &DocumentQuery) -> Result<(String, Value), StoreError> {
        let (parent, from) = match query.source {
            QuerySource::Collection(ref path) => {
                let path = path.trim_matches('/');
                let collection_id = path.rsplit('/').next().unwrap_or_default();
                if collection_id.is_empty() {
                    return Err(StoreError::invalid_query("Empty collection path"));
                }
                (
                    parent_path(path).to_string(),
                    json!([{"collectionId": collection_id}]),
                )
            }
            QuerySource::CollectionGroup(ref collection_id) => (
                String::new(),
                json!([{"collectionId": collection_id, "allDescendants": true}]),
            ),
        };

        let mut structured = json!({"from": from});
        let object = structured
            .as_object_mut()
            .ok_or_else(|| StoreError::unknown("Query body is not an object"))?;

        let filters: Vec<Value> = query
            .filters
            .iter()
            .map(|filter| {
                let (op, value) = match filter.op {
                    FilterOp::Equal(ref value) => ("EQUAL", self.codec.encode(value)),
                    FilterOp::LessThanOrEqual(ref value) => {
                        ("LESS_THAN_OR_EQUAL", self.codec.encode(value))
                    }
                    FilterOp::In(ref values) => (
                        "IN",
                        json!({"arrayValue": {
                            "values": values.iter().map(|v| self.codec.encode(v)).collect::<Vec<_>>()
                        }}),
                    ),
                };
                json!({"fieldFilter": {
                    "field": {"fieldPath": quote_field_path(&filter.field)},
                    "op": op,
                    "value": value,
                }})
            })
            .collect();
        match filters.len() {
            0 => {}
            1 => {
                object.insert("where".to_string(), filters[0].clone());
            }
            _ => {
                object.insert(
                    "where".to_string(),
                    json!({"compositeFilter": {"op": "AND", "filters": filters}}),
                );
            }
        }

        let mut order_by = Vec::new();
        if let Some(ref field) = query.order_by {
            order_by.push(json!({"field": {"fieldPath": quote_field_path(field)}, "direction": "ASCENDING"}));
        }
        order_by.push(json!({"field": {"fieldPath": DOCUMENT_NAME_FIELD}, "direction": "ASCENDING"}));
        object.insert("orderBy".to_string(), Value::Array(order_by));

        if let Some(ref cursor) = query.start_after {
            let mut values = Vec::new();
            if let Some(ref field) = query.order_by {
                let value = lookup_field(&cursor.data, field).ok_or_else(|| {
                    StoreError::invalid_query(format!(
                        "Cursor document {} lacks order field {}",
                        cursor.path, field
                    ))
                })?;
                values.push(self.codec.encode(value));
            }
            values.push(json!({"referenceValue": self.codec.document_name(&cursor.path)}));
            object.insert(
                "startAt".to_string(),
                json!({"values": values, "before": false}),
            );
        }

        if let Some(limit) = query.limit {
            object.insert("limit".to_string(), json!(limit));
        }

        Ok((parent, json!({"structuredQuery": structured})))
    }
}

/// Quote each segment of a dotted field path that isn't a plain identifier.
fn quote_field_path(field: &str) -> String {
    field
        .split('.')
        .map(|segment| {
            let simple = segment
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if simple {
                segment.to_string()
            } else {
                format!("`{}`", segment.replace('\\', "\\\\").replace('`', "\\`"))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[async_trait]
impl DocumentStore for FirestoreRestStore {
    async fn get_document(&self, path: &str) -> Result<Option<SourceDocument>, StoreError> {
        let result = self.send(self.client.get(self.url(path, None))).await;
        let response = match result {
            Ok(response) => response,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::codec(e.to_string()))?;
        self.parse_document(&body).map(Some)
    }

    async fn add_document(
        &self,
        collection: &str,
        data: DocumentData,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        self.send(
            self.client
                .post(self.url(collection, None))
                .query(&[("documentId", id.as_str())])
                .json(&json!({"fields": self.codec.encode_fields(&data)})),
        )
        .await?;

        debug!(collection = %collection, document_id = %id, "Added document");
        Ok(id)
    }

    async fn run_query(&self, query: &DocumentQuery) -> Result<Vec<SourceDocument>, StoreError> {
        let (parent, body) = self.structured_query(query)?;
        let response = self
            .send(
                self.client
                    .post(self.url(&parent, Some("runQuery")))
                    .json(&body),
            )
            .await?;

        let results: Vec<Value> = response
            .json()
            .await
            .map_err(|e| StoreError::codec(e.to_string()))?;

        results
            .iter()
            .filter_map(|result| result.get("document"))
            .map(|document| self.parse_document(document))
            .collect()
    }

    async fn commit(&self, writes: Vec<DocumentWrite>) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }

        let body = json!({
            "writes": writes.iter().map(|w| self.write_json(w)).collect::<Vec<_>>(),
        });
        self.send(self.client.post(self.url("", Some("commit"))).json(&body))
            .await?;

        debug!(writes = writes.len(), "Committed writes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firestore_typesense_sync_shared::DocumentValue;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROOT: &str = "projects/demo/databases/(default)/documents";

    fn store_for(server: &MockServer) -> FirestoreRestStore {
        let mut config = FirestoreConfig::new("demo");
        config.emulator_host = Some(server.uri());
        FirestoreRestStore::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_get_document_decodes_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/{}/books/1", ROOT)))
            .and(header("authorization", "Bearer owner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": format!("{}/books/1", ROOT),
                "fields": {"title": {"stringValue": "Title X"}},
                "updateTime": "2024-01-01T00:00:00.000001Z"
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let snapshot = store.get_document("books/1").await.unwrap().unwrap();
        assert_eq!(snapshot.id, "1");
        assert_eq!(snapshot.path, "books/1");
        assert_eq!(snapshot.get("title"), Some(&DocumentValue::from("Title X")));
        assert_eq!(
            snapshot.version.as_deref(),
            Some("2024-01-01T00:00:00.000001Z")
        );
    }

    #[tokio::test]
    async fn test_get_missing_document_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "not found", "status": "NOT_FOUND"}
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        assert!(store.get_document("books/none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collection_group_query_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1/{}:runQuery", ROOT)))
            .and(body_partial_json(json!({
                "structuredQuery": {
                    "from": [{"collectionId": "books", "allDescendants": true}],
                    "orderBy": [{"field": {"fieldPath": "__name__"}, "direction": "ASCENDING"}],
                    "startAt": {
                        "values": [{"referenceValue": format!("{}/users/1/books/9", ROOT)}],
                        "before": false
                    },
                    "limit": 2
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"document": {
                    "name": format!("{}/users/2/books/1", ROOT),
                    "fields": {},
                    "updateTime": "2024-01-01T00:00:00Z"
                }},
                {"readTime": "2024-01-01T00:00:00Z"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let cursor = SourceDocument::new("users/1/books/9", DocumentData::new());
        let query = DocumentQuery::collection_group("books")
            .start_after(cursor)
            .limit(2);
        let documents = store.run_query(&query).await.unwrap();

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].path, "users/2/books/1");
    }

    #[tokio::test]
    async fn test_filtered_collection_query_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1/{}:runQuery", ROOT)))
            .and(body_partial_json(json!({
                "structuredQuery": {
                    "from": [{"collectionId": "typesense_buffer"}],
                    "where": {"compositeFilter": {"op": "AND", "filters": [
                        {"fieldFilter": {
                            "field": {"fieldPath": "status"},
                            "op": "IN",
                            "value": {"arrayValue": {"values": [
                                {"stringValue": "pending"},
                                {"stringValue": "retrying"}
                            ]}}
                        }},
                        {"fieldFilter": {
                            "field": {"fieldPath": "retries"},
                            "op": "LESS_THAN_OR_EQUAL",
                            "value": {"integerValue": "3"}
                        }}
                    ]}}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let query = DocumentQuery::collection("typesense_buffer")
            .where_in("status", vec!["pending".into(), "retrying".into()])
            .where_lte("retries", 3i64)
            .order_by("timestamp");
        assert!(store.run_query(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_precondition_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1/{}:commit", ROOT)))
            .and(body_partial_json(json!({"writes": [{
                "updateMask": {"fieldPaths": ["status"]},
                "currentDocument": {"updateTime": "v1"}
            }]})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "stale", "status": "FAILED_PRECONDITION"}
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let mut fields = DocumentData::new();
        fields.insert("status".to_string(), "processing".into());
        let result = store
            .commit(vec![DocumentWrite::Update {
                path: "typesense_buffer/a".to_string(),
                fields,
                precondition: Some(Precondition::UpdateTime("v1".to_string())),
            }])
            .await;

        assert!(matches!(result, Err(StoreError::PreconditionFailed(_))));
    }

    #[test]
    fn test_quote_field_path() {
        assert_eq!(quote_field_path("status"), "status");
        assert_eq!(quote_field_path("user.name"), "user.name");
        assert_eq!(quote_field_path("user.first-name"), "user.`first-name`");
        assert_eq!(quote_field_path("1st"), "`1st`");
    }
}
