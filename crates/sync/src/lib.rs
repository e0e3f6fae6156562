//! Sync engine for the shelf library.
//!
//! Reconciles the local store against the remote backend with one simple
//! policy: the remote always wins when reachable, and the whole record is
//! the unit of truth. Reads go remote-first and fall back to cache;
//! writes go remote-first and fall back to a FIFO queue that is replayed
//! when connectivity returns.
//!
//! The model is deliberately single-device, single-queue, last-writer-
//! wins. There is no conflict resolution and no field-level merging.

mod engine;
pub mod error;
mod retry;

pub use crate::engine::{DrainReport, LibraryView, Origin, Submission, SyncEngine, SyncOptions};
pub use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};
