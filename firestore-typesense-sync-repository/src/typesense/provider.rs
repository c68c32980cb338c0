//! Typesense provider implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! on top of the Typesense HTTP API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use firestore_typesense_sync_shared::IndexableRecord;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::TypesenseConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::types::{DeleteByIdsResult, ImportAction, ImportSummary};
use crate::utils;

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";
/// Documents removed per internal batch by a filtered delete.
const DELETE_BATCH_SIZE: usize = 100;

/// Typesense provider implementation.
///
/// Holds every configured node and fails over to the next one on
/// connection-level errors. The last node that answered is tried first on the
/// next request. HTTP error statuses are returned as-is and never retried on
/// another node.
///
/// # Example
///
/// ```ignore
/// use firestore_typesense_sync_repository::{TypesenseConfig, TypesenseProvider};
///
/// let config = TypesenseConfig::single_node("http://localhost:8108", "books", "xyz")?;
/// let provider = TypesenseProvider::new(&config)?;
///
/// provider.delete_document("456").await?;
/// ```
pub struct TypesenseProvider {
    client: Client,
    nodes: Vec<Url>,
    api_key: String,
    collection_name: String,
    current_node: AtomicUsize,
}

impl TypesenseProvider {
    /// Create a provider from a cluster config.
    ///
    /// # Returns
    ///
    /// * `Ok(TypesenseProvider)` - A new provider instance
    /// * `Err(SearchIndexError)` - If the node list is invalid or the HTTP
    ///   client cannot be built
    pub fn new(config: &TypesenseConfig) -> Result<Self, SearchIndexError> {
        Self::with_nodes(
            config.node_urls()?,
            config.collection_name.clone(),
            config.api_key.clone(),
            config.connection_timeout,
        )
    }

    /// Create a provider from explicit node base URLs.
    pub fn with_nodes(
        nodes: Vec<Url>,
        collection_name: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchIndexError> {
        if nodes.is_empty() {
            return Err(SearchIndexError::validation(
                "At least one Typesense node is required",
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;
        let collection_name = collection_name.into();

        info!(
            nodes = nodes.len(),
            collection = %collection_name,
            "Created Typesense provider"
        );

        Ok(Self {
            client,
            nodes,
            api_key: api_key.into(),
            collection_name,
            current_node: AtomicUsize::new(0),
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Append path segments to a node base URL.
    fn endpoint(node: &Url, segments: &[&str]) -> Result<Url, SearchIndexError> {
        let mut url = node.clone();
        url.path_segments_mut()
            .map_err(|_| SearchIndexError::validation(format!("Invalid node URL {}", node)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn documents_endpoint(&self, node: &Url, extra: &[&str]) -> Result<Url, SearchIndexError> {
        let mut segments = vec!["collections", self.collection_name.as_str(), "documents"];
        segments.extend_from_slice(extra);
        Self::endpoint(node, &segments)
    }

    /// Send a request, failing over across nodes on connection errors.
    ///
    /// # Arguments
    ///
    /// * `build` - Builds the request against a node base URL
    ///
    /// # Returns
    ///
    /// * `Ok(Response)` - A response with a success status
    /// * `Err(SearchIndexError)` - If every node is unreachable or the engine
    ///   answers with an error status
    async fn send<F>(&self, build: F) -> Result<Response, SearchIndexError>
    where
        F: Fn(&Client, &Url) -> Result<RequestBuilder, SearchIndexError>,
    {
        let start = self.current_node.load(Ordering::Relaxed);
        let mut last_error = String::new();

        for offset in 0..self.nodes.len() {
            let index = (start + offset) % self.nodes.len();
            let node = &self.nodes[index];
            let request = build(&self.client, node)?.header(API_KEY_HEADER, &self.api_key);

            match request.send().await {
                Ok(response) => {
                    self.current_node.store(index, Ordering::Relaxed);
                    return Self::check_status(response).await;
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(node = %node, error = %e, "Typesense node unreachable, trying next node");
                    last_error = e.to_string();
                }
                Err(e) => return Err(SearchIndexError::connection(e.to_string())),
            }
        }

        Err(SearchIndexError::connection(format!(
            "All {} Typesense nodes failed: {}",
            self.nodes.len(),
            last_error
        )))
    }

    async fn check_status(response: Response) -> Result<Response, SearchIndexError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        Err(SearchIndexError::http_status(status.as_u16(), message))
    }

    async fn json_body(response: Response) -> Result<Value, SearchIndexError> {
        response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))
    }

    async fn text_body(response: Response) -> Result<String, SearchIndexError> {
        response
            .text()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))
    }
}

#[async_trait]
impl SearchIndexProvider for TypesenseProvider {
    async fn health(&self) -> Result<(), SearchIndexError> {
        let response = self
            .send(|client, node| Ok(client.get(Self::endpoint(node, &["health"])?)))
            .await?;
        let body = Self::json_body(response).await?;

        if body.get("ok").and_then(Value::as_bool) == Some(true) {
            Ok(())
        } else {
            Err(SearchIndexError::connection(format!(
                "Typesense reported unhealthy: {}",
                body
            )))
        }
    }

    async fn create_collection(&self, schema: &Value) -> Result<Value, SearchIndexError> {
        let mut schema = schema.clone();
        let object = schema
            .as_object_mut()
            .ok_or_else(|| SearchIndexError::validation("Collection schema must be an object"))?;
        object
            .entry("name")
            .or_insert_with(|| Value::String(self.collection_name.clone()));

        let response = self
            .send(|client, node| {
                Ok(client
                    .post(Self::endpoint(node, &["collections"])?)
                    .json(&schema))
            })
            .await
            .map_err(|e| SearchIndexError::collection(e.to_string()))?;

        info!(collection = %self.collection_name, "Created Typesense collection");
        Self::json_body(response).await
    }

    async fn delete_collection(&self) -> Result<(), SearchIndexError> {
        let result = self
            .send(|client, node| {
                Ok(client.delete(Self::endpoint(
                    node,
                    &["collections", self.collection_name.as_str()],
                )?))
            })
            .await;

        match result {
            Ok(_) => {
                info!(collection = %self.collection_name, "Deleted Typesense collection");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(collection = %self.collection_name, "Collection already absent");
                Ok(())
            }
            Err(e) => Err(SearchIndexError::collection(e.to_string())),
        }
    }

    async fn create_document(&self, record: &IndexableRecord) -> Result<(), SearchIndexError> {
        self.send(|client, node| {
            Ok(client
                .post(self.documents_endpoint(node, &[])?)
                .json(record))
        })
        .await?;
        debug!(document_id = %record.id(), "Created document");
        Ok(())
    }

    async fn upsert_document(&self, record: &IndexableRecord) -> Result<(), SearchIndexError> {
        self.send(|client, node| {
            Ok(client
                .post(self.documents_endpoint(node, &[])?)
                .query(&[("action", "upsert")])
                .json(record))
        })
        .await?;
        debug!(document_id = %record.id(), "Upserted document");
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<(), SearchIndexError> {
        let result = self
            .send(|client, node| Ok(client.delete(self.documents_endpoint(node, &[id])?)))
            .await;

        match result {
            Ok(_) => {
                debug!(document_id = %id, "Deleted document");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(document_id = %id, "Document not found during delete, ignoring");
                Ok(())
            }
            Err(e) => Err(SearchIndexError::delete(e.to_string())),
        }
    }

    async fn import_documents(
        &self,
        records: &[IndexableRecord],
        action: ImportAction,
    ) -> Result<ImportSummary, SearchIndexError> {
        if records.is_empty() {
            return Ok(ImportSummary::default());
        }

        let body = utils::to_jsonl(records)?;
        let response = self
            .send(|client, node| {
                Ok(client
                    .post(self.documents_endpoint(node, &["import"])?)
                    .query(&[("action", action.as_str()), ("return_id", "true")])
                    .header(reqwest::header::CONTENT_TYPE, "text/plain")
                    .body(body.clone()))
            })
            .await
            .map_err(|e| match e {
                SearchIndexError::ConnectionError(_) => e,
                other => SearchIndexError::import(other.to_string()),
            })?;

        let text = Self::text_body(response).await?;
        let summary = utils::parse_import_response(&text, records)?;
        debug!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Imported documents"
        );
        Ok(summary)
    }

    async fn delete_documents_by_ids(
        &self,
        ids: &[String],
    ) -> Result<DeleteByIdsResult, SearchIndexError> {
        if ids.is_empty() {
            return Ok(DeleteByIdsResult::default());
        }

        let filter = utils::id_filter(ids);
        let batch_size = DELETE_BATCH_SIZE.to_string();
        let response = self
            .send(|client, node| {
                Ok(client.delete(self.documents_endpoint(node, &[])?).query(&[
                    ("filter_by", filter.as_str()),
                    ("batch_size", batch_size.as_str()),
                    ("return_id", "true"),
                ]))
            })
            .await
            .map_err(|e| match e {
                SearchIndexError::ConnectionError(_) => e,
                other => SearchIndexError::delete(other.to_string()),
            })?;

        let body = Self::json_body(response).await?;
        let num_deleted = body
            .get("num_deleted")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchIndexError::parse("Delete response lacks num_deleted"))?
            as usize;
        let ids = body.get("ids").and_then(Value::as_array).map(|ids| {
            ids.iter()
                .filter_map(|id| match id {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        });

        Ok(DeleteByIdsResult { num_deleted, ids })
    }

    async fn export_documents(&self) -> Result<Vec<Value>, SearchIndexError> {
        let response = self
            .send(|client, node| Ok(client.get(self.documents_endpoint(node, &["export"])?)))
            .await?;
        let text = Self::text_body(response).await?;
        utils::parse_jsonl(&text)
    }
}

impl std::fmt::Debug for TypesenseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypesenseProvider")
            .field("nodes", &self.nodes)
            .field("collection_name", &self.collection_name)
            .finish_non_exhaustive()
    }
}
