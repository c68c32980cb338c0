//! Optional enrichment hook applied to documents before projection.
//!
//! The transformer posts a document to an HTTP function and uses the response
//! in its place. Any failure falls back to the original document, so
//! enrichment can never block indexing.

use firestore_typesense_sync_shared::{data_from_json, data_to_json, DocumentData, SourceDocument};
use reqwest::Client as ReqwestClient;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::TransformConfig;

#[derive(Debug, Clone)]
struct Endpoint {
    name: String,
    url: String,
    secret: Option<String>,
}

/// Client for the enrichment function.
#[derive(Debug, Clone)]
pub struct Transformer {
    client: ReqwestClient,
    endpoint: Option<Endpoint>,
}

impl Transformer {
    /// Create a transformer. `None` disables it.
    pub fn new(config: Option<&TransformConfig>) -> Self {
        match config {
            Some(config) => Self::with_url(config.url(), &config.function_name, config.secret.clone()),
            None => Self::disabled(),
        }
    }

    /// A transformer that returns documents unchanged.
    pub fn disabled() -> Self {
        Self {
            client: ReqwestClient::new(),
            endpoint: None,
        }
    }

    /// A transformer posting to an explicit URL.
    pub fn with_url(url: impl Into<String>, name: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            client: ReqwestClient::new(),
            endpoint: Some(Endpoint {
                name: name.into(),
                url: url.into(),
                secret,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Run a JSON document through the enrichment function.
    ///
    /// # Returns
    ///
    /// The response body, or `document` itself when the transformer is
    /// disabled, the call fails, the status is not a success or the body is
    /// null.
    pub async fn transform(&self, document: Value) -> Value {
        let Some(ref endpoint) = self.endpoint else {
            debug!("No transform function defined. Returning original document.");
            return document;
        };

        info!(function = %endpoint.name, "Calling transform function: {}", endpoint.name);
        let doc_id = document
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let mut request = self
            .client
            .post(&endpoint.url)
            .json(&json!({ "document": &document }));
        if let Some(ref secret) = endpoint.secret {
            request = request.bearer_auth(secret);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Error calling transform function: {}", e);
                return document;
            }
        };
        if !response.status().is_success() {
            warn!(
                status = %response.status(),
                "Transform function failed for document {}. Using original document.",
                doc_id
            );
            return document;
        }

        match response.json::<Value>().await {
            Ok(Value::Null) => {
                warn!(
                    "Transform function failed for document {}. Using original document.",
                    doc_id
                );
                document
            }
            Ok(transformed) => {
                info!("Transform function succeeded for document {}", doc_id);
                transformed
            }
            Err(e) => {
                error!(error = %e, "Error calling transform function: {}", e);
                document
            }
        }
    }

    /// Run a snapshot through the enrichment function.
    ///
    /// The snapshot is sent with its `id`. The result is treated as new
    /// document data; an `id` field in it is overwritten again at projection.
    pub async fn transform_document(&self, snapshot: &SourceDocument) -> DocumentData {
        if !self.is_enabled() {
            debug!("No transform function defined. Returning original document.");
            return snapshot.data.clone();
        }

        let mut body = data_to_json(&snapshot.data);
        body.insert("id".to_string(), Value::String(snapshot.id.clone()));
        let transformed = self.transform(Value::Object(body)).await;
        match transformed {
            Value::Object(_) => data_from_json(transformed),
            _ => snapshot.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_from_config() {
        let config = TransformConfig {
            function_name: "enrich".to_string(),
            secret: None,
            project_id: "demo".to_string(),
            region: "europe-west1".to_string(),
        };
        assert_eq!(
            config.url(),
            "https://europe-west1-demo.cloudfunctions.net/enrich"
        );
        assert!(Transformer::new(Some(&config)).is_enabled());
        assert!(!Transformer::new(None).is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_returns_input() {
        let doc = json!({"id": "1", "title": "x"});
        assert_eq!(Transformer::disabled().transform(doc.clone()).await, doc);
    }

    #[tokio::test]
    async fn test_success_returns_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/enrich"))
            .and(header("authorization", "Bearer s3cret"))
            .and(body_json(json!({"document": {"id": "1", "title": "x"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1", "title": "X!"})))
            .expect(1)
            .mount(&server)
            .await;

        let transformer = Transformer::with_url(
            format!("{}/enrich", server.uri()),
            "enrich",
            Some("s3cret".to_string()),
        );
        let result = transformer.transform(json!({"id": "1", "title": "x"})).await;
        assert_eq!(result, json!({"id": "1", "title": "X!"}));
    }

    #[tokio::test]
    async fn test_failure_status_returns_original() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transformer = Transformer::with_url(server.uri(), "enrich", None);
        let doc = json!({"id": "1"});
        assert_eq!(transformer.transform(doc.clone()).await, doc);
    }

    #[tokio::test]
    async fn test_null_body_returns_original() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
            .mount(&server)
            .await;

        let transformer = Transformer::with_url(server.uri(), "enrich", None);
        let doc = json!({"id": "1"});
        assert_eq!(transformer.transform(doc.clone()).await, doc);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_returns_original() {
        let transformer = Transformer::with_url("http://127.0.0.1:9/enrich", "enrich", None);
        let doc = json!({"id": "1"});
        assert_eq!(transformer.transform(doc.clone()).await, doc);
    }

    #[tokio::test]
    async fn test_transform_document_sends_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"document": {"id": "b1", "title": "x"}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"title": "x", "score": 5})),
            )
            .mount(&server)
            .await;

        let mut data = DocumentData::new();
        data.insert("title".to_string(), "x".into());
        let snapshot = SourceDocument::new("books/b1", data);

        let transformer = Transformer::with_url(server.uri(), "enrich", None);
        let result = transformer.transform_document(&snapshot).await;
        assert_eq!(result.get("score").and_then(|v| v.as_i64()), Some(5));
    }
}
