//! Dependency initialization and wiring for the sync engine.

use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::backfill::BackfillRunner;
use crate::buffer::BufferProcessor;
use crate::config::SyncConfig;
use crate::errors::{ConfigError, SyncError};
use crate::handler::ChangeHandler;
use crate::transformer::Transformer;
use firestore_typesense_sync_repository::{
    DocumentStore, FirestoreRestStore, SearchIndexProvider, TypesenseProvider,
};

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Connection mode for Typesense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if the health check fails.
    FailFast,
    /// Retry the health check until it succeeds.
    Retry,
}

impl ConnectionMode {
    /// Parse connection mode from environment variable.
    ///
    /// Valid values: "fail-fast" or "retry" (case-insensitive)
    /// Defaults to "fail-fast" if not set, "retry" if invalid.
    fn from_env() -> Self {
        match env::var("TYPESENSE_CONNECTION_MODE")
            .unwrap_or_else(|_| "fail-fast".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid TYPESENSE_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub config: SyncConfig,
    pub handler: ChangeHandler,
    pub processor: BufferProcessor,
    pub backfill: BackfillRunner,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// Besides the variables read by [`SyncConfig::from_env`]:
    ///
    /// - `TYPESENSE_CONNECTION_MODE`: "fail-fast" or "retry" (default: fail-fast)
    /// - `TYPESENSE_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(SyncError)` - If configuration is invalid or Typesense is
    ///   unreachable in fail-fast mode
    pub async fn new() -> Result<Self, SyncError> {
        let config = SyncConfig::from_env()?;
        let connection_mode = ConnectionMode::from_env();
        let retry_interval = env::var("TYPESENSE_RETRY_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_INTERVAL_SECS);

        info!(
            collection_path = %config.collection_path,
            typesense_hosts = ?config.typesense.hosts,
            typesense_collection = %config.typesense.collection_name,
            use_buffer = config.buffer.enabled,
            transform = config.transform.is_some(),
            connection_mode = ?connection_mode,
            "Initializing dependencies"
        );

        let search = TypesenseProvider::new(&config.typesense).map_err(|e| {
            ConfigError::invalid("TYPESENSE_HOSTS", format!("Failed to create Typesense provider: {}", e))
        })?;
        Self::wait_for_typesense(&search, connection_mode, Duration::from_secs(retry_interval))
            .await?;

        info!("Typesense connection established");

        let store = FirestoreRestStore::new(&config.firestore).map_err(|e| {
            ConfigError::invalid("FIRESTORE_PROJECT_ID", format!("Failed to create Firestore store: {}", e))
        })?;

        Ok(Self::wire(config, Arc::new(store), Arc::new(search)))
    }

    /// Build every component over the given backends.
    pub fn wire(
        config: SyncConfig,
        store: Arc<dyn DocumentStore>,
        search: Arc<dyn SearchIndexProvider>,
    ) -> Self {
        let transformer = Transformer::new(config.transform.as_ref());
        let handler = ChangeHandler::new(&config, store.clone(), search.clone(), transformer);
        let processor = BufferProcessor::new(&config, store.clone(), search.clone());
        let backfill = BackfillRunner::new(&config, store, search);

        Self {
            config,
            handler,
            processor,
            backfill,
        }
    }

    /// Block until Typesense answers its health check, per connection mode.
    async fn wait_for_typesense(
        search: &TypesenseProvider,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<(), SyncError> {
        loop {
            match search.health().await {
                Ok(()) => return Ok(()),
                Err(e) => match mode {
                    ConnectionMode::FailFast => return Err(e.into()),
                    ConnectionMode::Retry => {
                        warn!(
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to Typesense, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }
}
