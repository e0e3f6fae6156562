//! Sync Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.
//!
//! Lower-tier conditions (store unavailable, network failure) are absorbed
//! and logged inside the engine; what's left here is only what a caller
//! can meaningfully act on.

use derive_more::{Display, Error};

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Neither the network nor the local cache can satisfy the request;
    /// there is nothing left to fall back to.
    #[display("offline with no local copy available")]
    OfflineNoCache,
    /// A mutation reached neither the backend nor the local queue; it was
    /// not recorded anywhere and the caller must re-issue it.
    #[display("mutation could not be recorded")]
    MutationLost,
    /// The pending-mutation queue cannot be read.
    #[display("sync queue unavailable")]
    QueueUnavailable,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        true
    }
}
