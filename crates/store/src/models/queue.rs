use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::BookKind;

/// A mutation made while offline, waiting to be replayed against the
/// remote backend.
///
/// This is a closed set on purpose: the replay loop dispatches
/// exhaustively, so adding a variant forces every consumer to decide what
/// replaying it means. Payloads are serialized as tagged JSON in the
/// `sync_queue` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Record that a user gained access to a book.
    GrantAccess {
        user_id: String,
        book_id: String,
        access: BookKind,
    },
    /// Redeem an access code for a gated book.
    RedeemCode {
        user_id: String,
        book_id: String,
        code: String,
    },
    /// Flip the remote `downloaded` flag after a local download finished.
    MarkDownloaded { user_id: String, book_id: String },
}

impl Mutation {
    pub fn user_id(&self) -> &str {
        match self {
            Self::GrantAccess { user_id, .. }
            | Self::RedeemCode { user_id, .. }
            | Self::MarkDownloaded { user_id, .. } => user_id,
        }
    }

    pub fn book_id(&self) -> &str {
        match self {
            Self::GrantAccess { book_id, .. }
            | Self::RedeemCode { book_id, .. }
            | Self::MarkDownloaded { book_id, .. } => book_id,
        }
    }

    /// Short operation tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GrantAccess { .. } => "grant_access",
            Self::RedeemCode { .. } => "redeem_code",
            Self::MarkDownloaded { .. } => "mark_downloaded",
        }
    }
}

/// A queued mutation as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMutation {
    /// Auto-assigned, strictly increasing; the queue is FIFO by this id.
    pub id: i64,
    pub mutation: Mutation,
    pub queued_at: OffsetDateTime,
}
