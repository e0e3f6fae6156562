//! Store Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally. Callers are expected to treat [`Unavailable`](ErrorKind::Unavailable)
/// as a cache miss and fall back, never as a fatal condition.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Local persistent storage cannot be opened, read or written
    /// (missing file permissions, exhausted disk quota, a locked database).
    #[display("local store unavailable")]
    Unavailable,
    #[display("schema migration error")]
    Migration,
    /// A stored value did not round-trip (corrupt timestamp, unknown status
    /// tag, malformed queue payload).
    #[display("invalid stored data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
