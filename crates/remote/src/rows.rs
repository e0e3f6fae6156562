//! Wire representations of backend rows.
//!
//! The row API serves JSON; unknown fields are ignored so a backend
//! column addition never breaks deserialization.

use serde::Deserialize;
use shelf_store::models::{BookMetadata, LibraryEntry, LibraryRecord, SyncStatus};
use time::OffsetDateTime;

/// One row of `user_library` joined with its `books` record.
#[derive(Debug, Deserialize)]
pub(crate) struct LibraryRow {
    pub(crate) id: String,
    pub(crate) book_id: String,
    #[serde(default)]
    pub(crate) downloaded: bool,
    #[serde(default)]
    pub(crate) sync_status: Option<SyncStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub(crate) downloaded_at: Option<OffsetDateTime>,
    /// The embedded join; may be missing if the catalogue row was removed.
    #[serde(default)]
    pub(crate) books: Option<BookMetadata>,
}

impl LibraryRow {
    /// Build the domain record, attaching the user the query ran for.
    ///
    /// `fetched_at` seeds `cached_at`; the store re-stamps it on write.
    pub(crate) fn into_record(self, user_id: &str, fetched_at: OffsetDateTime) -> LibraryRecord {
        LibraryRecord {
            entry: LibraryEntry {
                id: self.id,
                user_id: user_id.to_string(),
                book_id: self.book_id,
                downloaded: self.downloaded,
                sync_status: self.sync_status.unwrap_or(SyncStatus::Synced),
                downloaded_at: self.downloaded_at,
                cached_at: fetched_at,
            },
            book: self.books,
        }
    }
}

/// Minimal projection of a `user_book_access` row; existence is all the
/// access check needs.
#[derive(Debug, Deserialize)]
pub(crate) struct AccessRow {
    #[allow(dead_code)]
    pub(crate) book_id: String,
}

/// Payload returned by the `redeem_book_code` procedure.
#[derive(Debug, Deserialize)]
pub(crate) struct RedemptionRow {
    #[serde(default)]
    pub(crate) success: Option<bool>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

impl From<RedemptionRow> for crate::Redemption {
    fn from(row: RedemptionRow) -> Self {
        Self {
            success: row.success.unwrap_or(false),
            message: row.message.unwrap_or_else(|| "Redemption failed".to_string()),
        }
    }
}
