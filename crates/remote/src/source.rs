//! The `RemoteSource` trait and its structured results.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shelf_store::models::{BookKind, BookMetadata, LibraryRecord};
use std::sync::Arc;

/// Shared handle to a remote source implementation.
pub type RemoteHandle = Arc<dyn RemoteSource + Send + Sync>;

/// Outcome of applying one mutation at the backend.
///
/// `Rejected` means the backend answered and said no - a constraint
/// violation, an invalid code, a missing row. Retrying an identical
/// request cannot change the answer, which is exactly what separates this
/// from a transport error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Accepted,
    Rejected(String),
}

impl Applied {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Result of the code-redemption procedure.
///
/// Mirrors the backend's own shape: a success flag plus a human-readable
/// message either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub success: bool,
    pub message: String,
}

/// Unified interface to the hosted backend.
///
/// All operations are asynchronous and bounded by the transport's
/// timeout. Implementations must be usable behind `Arc<dyn RemoteSource>`
/// so the sync engine and the CLI can share one client.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch a user's library entries joined with their book metadata.
    async fn fetch_library(&self, user_id: &str) -> Result<Vec<LibraryRecord>>;

    /// Fetch the active catalogue for one tier, newest first.
    async fn fetch_books(&self, kind: BookKind) -> Result<Vec<BookMetadata>>;

    /// Whether the user currently holds access to the book.
    async fn check_access(&self, user_id: &str, book_id: &str) -> Result<bool>;

    /// Record an access grant.
    ///
    /// Granting twice is not a failure: the backend reports the duplicate
    /// and implementations answer [`Applied::Accepted`], matching the
    /// "already has access" semantics of the storefront.
    async fn grant_access(&self, user_id: &str, book_id: &str, access: BookKind) -> Result<Applied>;

    /// Redeem an access code for a gated book.
    ///
    /// The code is upper-cased before submission; comparison at the
    /// backend is case-insensitive by convention.
    async fn redeem_code(&self, user_id: &str, book_id: &str, code: &str) -> Result<Redemption>;

    /// Flip the remote `downloaded` flag for a (user, book) entry.
    async fn mark_downloaded(&self, user_id: &str, book_id: &str) -> Result<Applied>;
}
