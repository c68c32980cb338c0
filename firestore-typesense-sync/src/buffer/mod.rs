//! Buffered writes.
//!
//! - [`Buffer`]: the durable queue of pending index mutations
//! - [`BufferProcessor`]: the scheduled drain applying them to the index

mod processor;
mod queue;

pub use processor::{BufferProcessor, DrainSummary, MISSING_FROM_INDEX, MISSING_PAYLOAD};
pub use queue::{Buffer, ClaimedEntry, FailedEntry, PROCESSING_TIMED_OUT};
