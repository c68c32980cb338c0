//! # Firestore Typesense Sync
//!
//! Keeps a Typesense collection in sync with a Firestore collection, including
//! dynamically matched subcollections.
//!
//! ## Architecture
//!
//! Source documents flow through a projection pipeline into the index:
//!
//! 1. **ChangeHandler**: Reacts to one create, update or delete notification
//! 2. **Transformer**: Optionally enriches a document through an HTTP function
//! 3. **DocumentProjector**: Turns a document into an indexable record
//! 4. **Buffer / BufferProcessor**: Durably queue mutations and drain them
//!    with bounded retries
//! 5. **BackfillRunner**: Re-imports the whole collection on demand
//!
//! ## Modules
//!
//! - [`config`]: Configuration and dependency initialization
//! - [`projector`]: Field extraction, value mapping and flattening
//! - [`transformer`]: Enrichment hook
//! - [`handler`]: Change notification handling
//! - [`buffer`]: Buffered writes
//! - [`backfill`]: Full reconciliation
//! - [`errors`]: Error types for the engine

pub mod backfill;
pub mod buffer;
pub mod config;
pub mod errors;
pub mod handler;
pub mod projector;
pub mod transformer;

pub use backfill::{BackfillOutcome, BackfillRunner, BackfillSummary};
pub use buffer::{Buffer, BufferProcessor, ClaimedEntry, DrainSummary};
pub use config::{Dependencies, SyncConfig};
pub use errors::{ConfigError, SyncError};
pub use handler::{ChangeEvent, ChangeHandler, ChangeKind, ChangeOutcome};
pub use projector::DocumentProjector;
pub use transformer::Transformer;
