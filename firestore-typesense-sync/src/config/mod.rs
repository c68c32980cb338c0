//! Configuration and dependency initialization for the sync engine.
//!
//! [`SyncConfig`] is built once at process start from the environment and
//! handed to every component constructor. Nothing reads the environment after
//! that.

mod dependencies;

pub use dependencies::{ConnectionMode, Dependencies};

use std::env;
use std::time::Duration;

use firestore_typesense_sync_repository::{FirestoreConfig, TypesenseConfig};
use firestore_typesense_sync_shared::{FieldSelector, PathPattern};

use crate::errors::ConfigError;

/// Default control document that arms a backfill.
pub const DEFAULT_BACKFILL_TRIGGER_DOCUMENT: &str = "typesense_sync/backfill";
/// Default backfill page size.
pub const DEFAULT_BACKFILL_BATCH_SIZE: usize = 1000;
/// Default buffer collection.
pub const DEFAULT_BUFFER_COLLECTION: &str = "typesense_buffer";
/// Default number of buffer entries drained per run.
pub const DEFAULT_BUFFER_BATCH_SIZE: usize = 100;
/// Default retry budget of a buffer entry.
pub const DEFAULT_BUFFER_MAX_RETRIES: u32 = 3;
/// Default drain interval.
pub const DEFAULT_BUFFER_FLUSH_INTERVAL: Duration = Duration::from_secs(3 * 60);
/// Default region of the transform function.
pub const DEFAULT_TRANSFORM_REGION: &str = "us-central1";

const DEFAULT_TYPESENSE_PORT: u16 = 443;
const DEFAULT_TYPESENSE_PROTOCOL: &str = "https";
const DEFAULT_TYPESENSE_TIMEOUT_SECS: u64 = 60;

/// Backfill settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillConfig {
    /// Path of the control document that arms a backfill.
    pub trigger_document: String,
    /// Documents fetched and imported per page.
    pub batch_size: usize,
}

/// Buffered write settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferConfig {
    /// Route change events through the buffer instead of writing directly.
    pub enabled: bool,
    pub collection_path: String,
    /// Entries claimed per drain.
    pub batch_size: usize,
    pub max_retries: u32,
    pub flush_interval: Duration,
    /// Requeue `processing` entries claimed longer ago than this.
    pub stale_processing_after: Option<Duration>,
}

/// Location and credential of the enrichment function.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformConfig {
    pub function_name: String,
    pub secret: Option<String>,
    pub project_id: String,
    pub region: String,
}

impl TransformConfig {
    /// `https://{region}-{project}.cloudfunctions.net/{name}`
    pub fn url(&self) -> String {
        format!(
            "https://{}-{}.cloudfunctions.net/{}",
            self.region, self.project_id, self.function_name
        )
    }
}

/// Immutable configuration of the whole engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Source collection path, possibly with `{placeholder}` segments.
    pub collection_path: PathPattern,
    /// Fields to project. Empty means every field.
    pub field_selector: FieldSelector,
    pub flatten_nested_documents: bool,
    /// Log whole records instead of ids on upsert and backfill.
    pub log_inserts: bool,
    pub typesense: TypesenseConfig,
    pub backfill: BackfillConfig,
    pub buffer: BufferConfig,
    /// `None` disables the transformer.
    pub transform: Option<TransformConfig>,
    pub firestore: FirestoreConfig,
}

impl SyncConfig {
    /// Load the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load the configuration from an arbitrary variable lookup.
    ///
    /// # Arguments
    ///
    /// * `lookup` - Returns the value of a variable, or `None` when unset
    ///
    /// # Returns
    ///
    /// * `Ok(SyncConfig)` - The parsed configuration
    /// * `Err(ConfigError)` - If a required variable is missing or a value is invalid
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let collection_path = vars.required("FIRESTORE_COLLECTION_PATH")?;
        let collection_path = PathPattern::parse(&collection_path)
            .map_err(|e| ConfigError::invalid("FIRESTORE_COLLECTION_PATH", e.to_string()))?;

        let typesense = TypesenseConfig {
            hosts: vars
                .required("TYPESENSE_HOSTS")?
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect(),
            port: vars.parsed("TYPESENSE_PORT", DEFAULT_TYPESENSE_PORT)?,
            protocol: vars
                .optional("TYPESENSE_PROTOCOL")
                .unwrap_or_else(|| DEFAULT_TYPESENSE_PROTOCOL.to_string()),
            collection_name: vars.required("TYPESENSE_COLLECTION_NAME")?,
            api_key: vars.required("TYPESENSE_API_KEY")?,
            connection_timeout: Duration::from_secs(vars.parsed(
                "TYPESENSE_CONNECTION_TIMEOUT_SECS",
                DEFAULT_TYPESENSE_TIMEOUT_SECS,
            )?),
        };

        let backfill = BackfillConfig {
            trigger_document: vars
                .optional("TYPESENSE_BACKFILL_TRIGGER_DOCUMENT")
                .unwrap_or_else(|| DEFAULT_BACKFILL_TRIGGER_DOCUMENT.to_string()),
            batch_size: vars.positive("TYPESENSE_BACKFILL_BATCH_SIZE", DEFAULT_BACKFILL_BATCH_SIZE)?,
        };

        let flush_interval = match vars.optional("TYPESENSE_BUFFER_FLUSH_INTERVAL") {
            Some(raw) => parse_interval(&raw)
                .map_err(|e| ConfigError::invalid("TYPESENSE_BUFFER_FLUSH_INTERVAL", e))?,
            None => DEFAULT_BUFFER_FLUSH_INTERVAL,
        };
        let stale_processing_after = match vars.optional("TYPESENSE_BUFFER_STALE_PROCESSING_MINUTES")
        {
            Some(_) => {
                let minutes =
                    vars.positive::<u64>("TYPESENSE_BUFFER_STALE_PROCESSING_MINUTES", 1)?;
                let seconds = minutes.checked_mul(60).ok_or_else(|| {
                    ConfigError::invalid("TYPESENSE_BUFFER_STALE_PROCESSING_MINUTES", "too large")
                })?;
                Some(Duration::from_secs(seconds))
            }
            None => None,
        };
        let buffer = BufferConfig {
            enabled: vars.flag("TYPESENSE_USE_BUFFER"),
            collection_path: vars
                .optional("TYPESENSE_BUFFER_COLLECTION_IN_FIRESTORE")
                .unwrap_or_else(|| DEFAULT_BUFFER_COLLECTION.to_string()),
            batch_size: vars.positive("TYPESENSE_BUFFER_BATCH_SIZE", DEFAULT_BUFFER_BATCH_SIZE)?,
            max_retries: vars.parsed("TYPESENSE_BUFFER_MAX_RETRIES", DEFAULT_BUFFER_MAX_RETRIES)?,
            flush_interval,
            stale_processing_after,
        };

        let mut firestore = FirestoreConfig::new(
            vars.optional("FIRESTORE_PROJECT_ID")
                .or_else(|| vars.optional("GOOGLE_CLOUD_PROJECT"))
                .ok_or_else(|| ConfigError::missing("FIRESTORE_PROJECT_ID"))?,
        );
        if let Some(database_id) = vars.optional("FIRESTORE_DATABASE_ID") {
            firestore.database_id = database_id;
        }
        firestore.access_token = vars.optional("FIRESTORE_ACCESS_TOKEN");
        firestore.emulator_host = vars.optional("FIRESTORE_EMULATOR_HOST");

        let transform = match vars.optional("TRANSFORM_FUNCTION_NAME") {
            Some(function_name) => Some(TransformConfig {
                function_name,
                secret: vars.optional("TRANSFORM_FUNCTION_SECRET"),
                project_id: vars
                    .optional("TRANSFORM_FUNCTION_PROJECT_ID")
                    .unwrap_or_else(|| firestore.project_id.clone()),
                region: vars
                    .optional("TRANSFORM_FUNCTION_REGION")
                    .unwrap_or_else(|| DEFAULT_TRANSFORM_REGION.to_string()),
            }),
            None => None,
        };

        Ok(Self {
            collection_path,
            field_selector: FieldSelector::parse(
                &vars.optional("FIRESTORE_COLLECTION_FIELDS").unwrap_or_default(),
            ),
            flatten_nested_documents: vars.flag("FLATTEN_NESTED_DOCUMENTS"),
            log_inserts: vars.flag("LOG_TYPESENSE_INSERTS"),
            typesense,
            backfill,
            buffer,
            transform,
            firestore,
        })
    }
}

/// Typed access to a variable lookup.
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    /// The trimmed value, treating blank as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::missing(key))
    }

    /// `true` (any case) enables; anything else disables.
    fn flag(&self, key: &str) -> bool {
        self.optional(key)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(key, format!("{} ({})", raw, e))),
            None => Ok(default),
        }
    }

    fn positive<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr + PartialOrd + Default,
        T::Err: std::fmt::Display,
    {
        let value = self.parsed(key, default)?;
        if value > T::default() {
            Ok(value)
        } else {
            Err(ConfigError::invalid(key, "must be greater than zero"))
        }
    }
}

/// Parse a schedule such as `every 3 minutes`, `5 minutes` or a plain number
/// of seconds.
pub fn parse_interval(raw: &str) -> Result<Duration, String> {
    let text = raw.trim().to_ascii_lowercase();
    let text = text.strip_prefix("every").unwrap_or(&text).trim();

    if let Ok(seconds) = text.parse::<u64>() {
        return non_zero(Duration::from_secs(seconds), raw);
    }

    let mut parts = text.split_whitespace();
    let (Some(amount), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("unrecognised interval '{}'", raw));
    };
    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("unrecognised interval '{}'", raw))?;
    let unit_secs = match unit.trim_end_matches('s') {
        "second" | "sec" => 1,
        "minute" | "min" => 60,
        "hour" => 3600,
        _ => return Err(format!("unrecognised interval unit '{}'", unit)),
    };
    let seconds = amount
        .checked_mul(unit_secs)
        .ok_or_else(|| format!("interval '{}' is too large", raw))?;
    non_zero(Duration::from_secs(seconds), raw)
}

fn non_zero(duration: Duration, raw: &str) -> Result<Duration, String> {
    if duration.is_zero() {
        Err(format!("interval '{}' must be greater than zero", raw))
    } else {
        Ok(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let mut vars: HashMap<String, String> = [
            ("FIRESTORE_COLLECTION_PATH", "books"),
            ("TYPESENSE_HOSTS", "localhost"),
            ("TYPESENSE_COLLECTION_NAME", "books_firestore"),
            ("TYPESENSE_API_KEY", "xyz"),
            ("FIRESTORE_PROJECT_ID", "demo"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            vars.insert(k.to_string(), v.to_string());
        }
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.collection_path.as_str(), "books");
        assert!(config.field_selector.is_empty());
        assert!(!config.flatten_nested_documents);
        assert_eq!(config.typesense.port, 443);
        assert_eq!(config.typesense.protocol, "https");
        assert_eq!(config.backfill.trigger_document, "typesense_sync/backfill");
        assert_eq!(config.backfill.batch_size, 1000);
        assert!(!config.buffer.enabled);
        assert_eq!(config.buffer.max_retries, 3);
        assert_eq!(config.buffer.flush_interval, Duration::from_secs(180));
        assert!(config.buffer.stale_processing_after.is_none());
        assert!(config.transform.is_none());
    }

    #[test]
    fn test_full_configuration() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("FIRESTORE_COLLECTION_PATH", "users/{userId}/books"),
            ("FIRESTORE_COLLECTION_FIELDS", "author=writer, title"),
            ("FLATTEN_NESTED_DOCUMENTS", "TRUE"),
            ("TYPESENSE_HOSTS", "a.example.com, b.example.com"),
            ("TYPESENSE_PORT", "8108"),
            ("TYPESENSE_PROTOCOL", "http"),
            ("TYPESENSE_USE_BUFFER", "true"),
            ("TYPESENSE_BUFFER_FLUSH_INTERVAL", "every 5 minutes"),
            ("TYPESENSE_BUFFER_STALE_PROCESSING_MINUTES", "10"),
            ("TRANSFORM_FUNCTION_NAME", "enrich"),
            ("TRANSFORM_FUNCTION_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert!(config.collection_path.is_collection_group());
        assert_eq!(config.field_selector.renames().count(), 1);
        assert!(config.flatten_nested_documents);
        assert_eq!(config.typesense.hosts.len(), 2);
        assert!(config.buffer.enabled);
        assert_eq!(config.buffer.flush_interval, Duration::from_secs(300));
        assert_eq!(
            config.buffer.stale_processing_after,
            Some(Duration::from_secs(600))
        );
        let transform = config.transform.unwrap();
        assert_eq!(
            transform.url(),
            "https://us-central1-demo.cloudfunctions.net/enrich"
        );
        assert_eq!(transform.secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_missing_required_variable() {
        let result = SyncConfig::from_lookup(lookup(&[("TYPESENSE_API_KEY", " ")]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::missing("TYPESENSE_API_KEY")
        );
    }

    #[test]
    fn test_invalid_number() {
        let result = SyncConfig::from_lookup(lookup(&[("TYPESENSE_BUFFER_BATCH_SIZE", "lots")]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));

        let result = SyncConfig::from_lookup(lookup(&[("TYPESENSE_BACKFILL_BATCH_SIZE", "0")]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_flags_accept_only_true() {
        let config = SyncConfig::from_lookup(lookup(&[("TYPESENSE_USE_BUFFER", "yes")])).unwrap();
        assert!(!config.buffer.enabled);
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("every 3 minutes"), Ok(Duration::from_secs(180)));
        assert_eq!(parse_interval("1 hour"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_interval("45"), Ok(Duration::from_secs(45)));
        assert!(parse_interval("every day").is_err());
        assert!(parse_interval("0").is_err());
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        assert!(parse_interval("every 18446744073709551615 hours").is_err());

        let result = SyncConfig::from_lookup(lookup(&[(
            "TYPESENSE_BUFFER_STALE_PROCESSING_MINUTES",
            "18446744073709551615",
        )]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));

        let result = SyncConfig::from_lookup(lookup(&[(
            "TYPESENSE_BUFFER_FLUSH_INTERVAL",
            "every 18446744073709551615 minutes",
        )]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
