use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Cached metadata for one book in the catalogue.
///
/// A successful remote fetch replaces the whole record; fields are never
/// merged individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub id: String,
    pub title: String,
    pub author: String,
    pub cover_url: Option<String>,
    /// Total size of the book's file in bytes, as reported by the backend.
    pub file_size: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Catalogue tier of a book, doubling as the access kind recorded when a
/// user is granted a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookKind {
    /// Openly accessible titles.
    Free,
    /// Titles gated behind a redeemable access code.
    Coded,
}

impl BookKind {
    /// Wire representation used by the backend (`book_type` / `access_type`
    /// columns).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Coded => "CODED",
        }
    }
}

impl std::fmt::Display for BookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
