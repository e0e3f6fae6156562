//! Gateway Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.
//!
//! These never escape to the application: the worker's public surface
//! answers every request with a [`Response`](crate::Response), absorbing
//! failures into cache fallbacks or synthesized 503s.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A gateway error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The byte cache cannot be read or written.
    #[display("byte cache I/O error: {_0}")]
    Cache(IoError),
    /// Transient inability to reach the network.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The transport deadline elapsed.
    #[display("request timed out")]
    Timeout,
    /// A cache entry did not round-trip (corrupt sidecar, bad status).
    #[display("invalid cache entry")]
    InvalidEntry,
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Cache(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}
