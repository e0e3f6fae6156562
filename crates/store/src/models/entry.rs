use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::BookMetadata;

/// Where a library entry is in its journey to the remote backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local change not yet sent.
    Pending,
    /// Replay in flight.
    Syncing,
    /// Remote has confirmed this entry.
    Synced,
    /// Remote rejected the change; needs user attention.
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    /// Parse the database/wire representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "syncing" => Some(Self::Syncing),
            "synced" => Some(Self::Synced),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (user, book) membership record in the local library mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    /// Whether the file content has been downloaded to the chunk store.
    pub downloaded: bool,
    pub sync_status: SyncStatus,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub downloaded_at: Option<OffsetDateTime>,
    /// Stamped by the store on every write; the staleness signal for a
    /// future eviction pass.
    #[serde(with = "time::serde::rfc3339")]
    pub cached_at: OffsetDateTime,
}

/// A library entry together with whatever book metadata the store has for
/// it.
///
/// The metadata side is optional: an entry can be cached before its book
/// record has ever been fetched (or after the catalogue row disappeared),
/// and readers still want the membership itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRecord {
    pub entry: LibraryEntry,
    pub book: Option<BookMetadata>,
}

impl LibraryRecord {
    /// Whether this record is fully usable with no network at all.
    pub fn available_offline(&self) -> bool {
        self.entry.downloaded
    }
}

impl From<LibraryRecord> for LibraryEntry {
    fn from(record: LibraryRecord) -> Self {
        record.entry
    }
}
