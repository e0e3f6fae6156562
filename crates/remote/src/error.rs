//! Remote Boundary Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.
//!
//! Only *transport-level* failures are errors here. A backend that answers
//! "no" is a structured result (see [`Redemption`](crate::Redemption) and
//! [`Applied`](crate::Applied)), never an `Err`.

use derive_more::{Display, Error};

/// A remote-boundary error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Transient inability to reach the backend.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The transport deadline elapsed before the backend answered.
    #[display("request timed out")]
    Timeout,
    /// Malformed data crossing the boundary (either direction).
    #[display("invalid data at the remote boundary")]
    InvalidResponse,
    /// The configured backend URL cannot address the row API.
    #[display("invalid backend endpoint: {_0}")]
    InvalidEndpoint(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}
