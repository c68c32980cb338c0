//! Firestore Typesense Sync Main Entry Point
//!
//! Usage:
//!
//! ```text
//! firestore-typesense-sync process-buffer          # drain on the flush interval until Ctrl-C
//! firestore-typesense-sync process-buffer-once     # drain once
//! firestore-typesense-sync backfill                # backfill if the trigger document is armed
//! firestore-typesense-sync handle-change <path> [--deleted]
//! ```

use std::env;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use firestore_typesense_sync::{ChangeEvent, Dependencies, SyncError};
use firestore_typesense_sync_shared::{normalize_path, DocumentData};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Drain the buffer on every flush interval until Ctrl-C
    ProcessBuffer,
    /// Drain the buffer once
    ProcessBufferOnce,
    /// Backfill if the trigger document is armed
    Backfill,
    /// Sync the current state of one document
    HandleChange {
        /// Path of the changed document
        path: String,
        /// Treat the document as deleted
        #[arg(long)]
        deleted: bool,
    },
}

/// Initialize tracing/logging.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("firestore_typesense_sync=info,firestore_typesense_sync_repository=info"));

    let json_output = env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();

        info!(
            service_name = "firestore-typesense-sync",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with JSON format"
        );
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .init();

        info!(
            service_name = "firestore-typesense-sync",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with console output"
        );
    }
}

async fn run(deps: Dependencies, command: Command) -> Result<(), SyncError> {
    match command {
        Command::ProcessBuffer => {
            deps.processor
                .run(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
        }
        Command::ProcessBufferOnce => {
            let summary = deps.processor.run_once().await?;
            info!(?summary, "Buffer drained");
            Ok(())
        }
        Command::Backfill => {
            let outcome = deps.backfill.run_from_trigger_document().await?;
            info!(?outcome, "Backfill finished");
            Ok(())
        }
        Command::HandleChange { path, deleted } => {
            let path = normalize_path(&path);
            if path == normalize_path(deps.backfill.trigger_document()) {
                let outcome = deps.backfill.run_from_trigger_document().await?;
                info!(?outcome, "Backfill finished");
                return Ok(());
            }
            let event = if deleted {
                ChangeEvent::deleted(path, DocumentData::new())
            } else {
                ChangeEvent::updated(path, DocumentData::new(), DocumentData::new())
            };
            let outcome = deps.handler.handle(&event).await?;
            info!(?outcome, "Change handled");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), SyncError> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing();

    let command = Cli::parse().command;

    info!(?command, "Starting Firestore Typesense sync");

    let deps = match Dependencies::new().await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    match run(deps, command).await {
        Ok(()) => {
            info!("Firestore Typesense sync completed successfully");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Firestore Typesense sync failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handle_change() {
        let cli = Cli::try_parse_from([
            "firestore-typesense-sync",
            "handle-change",
            "books/b1",
            "--deleted",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::HandleChange {
                path: "books/b1".to_string(),
                deleted: true,
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["firestore-typesense-sync", "reindex"]).is_err());
        assert!(Cli::try_parse_from(["firestore-typesense-sync", "handle-change"]).is_err());
    }
}
