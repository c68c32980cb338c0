//! Connection settings for the Typesense and Firestore backends.

use std::time::Duration;

use url::Url;

use crate::errors::SearchIndexError;

/// Connection settings for a Typesense cluster.
#[derive(Debug, Clone)]
pub struct TypesenseConfig {
    /// Host names of every node, tried in order.
    pub hosts: Vec<String>,
    pub port: u16,
    /// `http` or `https`.
    pub protocol: String,
    pub collection_name: String,
    pub api_key: String,
    /// Per-request timeout.
    pub connection_timeout: Duration,
}

impl TypesenseConfig {
    /// Create a config for a single node with the default timeout.
    pub fn single_node(
        node_url: &str,
        collection_name: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, SearchIndexError> {
        let url = Url::parse(node_url).map_err(|e| SearchIndexError::validation(e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| SearchIndexError::validation(format!("No host in {}", node_url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| SearchIndexError::validation(format!("No port in {}", node_url)))?;

        Ok(Self {
            hosts: vec![host.to_string()],
            port,
            protocol: url.scheme().to_string(),
            collection_name: collection_name.into(),
            api_key: api_key.into(),
            connection_timeout: Duration::from_secs(60),
        })
    }

    /// Base URL of every configured node.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Url>)` - One URL per host, in configuration order
    /// * `Err(SearchIndexError)` - If no host is configured or a host is invalid
    pub fn node_urls(&self) -> Result<Vec<Url>, SearchIndexError> {
        if self.hosts.is_empty() {
            return Err(SearchIndexError::validation(
                "At least one Typesense host must be configured",
            ));
        }

        self.hosts
            .iter()
            .map(|host| {
                let raw = format!("{}://{}:{}/", self.protocol, host, self.port);
                Url::parse(&raw).map_err(|e| {
                    SearchIndexError::validation(format!("Invalid Typesense node {}: {}", raw, e))
                })
            })
            .collect()
    }
}

/// Connection settings for the Firestore REST API.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database_id: String,
    /// OAuth2 bearer token. Not needed against the emulator.
    pub access_token: Option<String>,
    /// `host:port` of a local emulator. Overrides the public endpoint.
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    pub const DEFAULT_DATABASE: &'static str = "(default)";
    const PUBLIC_ENDPOINT: &'static str = "https://firestore.googleapis.com";

    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: Self::DEFAULT_DATABASE.to_string(),
            access_token: None,
            emulator_host: None,
        }
    }

    /// Scheme and host of the REST endpoint.
    pub fn endpoint(&self) -> String {
        match self.emulator_host {
            Some(ref host) if host.starts_with("http://") || host.starts_with("https://") => {
                host.trim_end_matches('/').to_string()
            }
            Some(ref host) => format!("http://{}", host),
            None => Self::PUBLIC_ENDPOINT.to_string(),
        }
    }

    /// Resource name of the documents root,
    /// `projects/{project}/databases/{database}/documents`.
    pub fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database_id
        )
    }
}
