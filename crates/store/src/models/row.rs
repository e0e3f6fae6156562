//! SQLite representations of the domain models.
//!
//! Timestamps are stored as unix seconds, status enums as their string
//! tags, queue payloads as tagged JSON. Conversions are fallible in the
//! read direction only: the database can hold data written by a future
//! (or corrupted) version of the schema.

use exn::{OptionExt, ResultExt};
use sqlx::Row as _;
use time::OffsetDateTime;

use crate::error::{Error, ErrorKind};
use crate::models::{
    BookMetadata, FileChunk, LibraryEntry, LibraryRecord, Mutation, QueuedMutation, SyncStatus,
};

fn timestamp(value: i64, field: &'static str) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::from_unix_timestamp(value).or_raise(|| ErrorKind::InvalidData(field))
}

fn status(value: &str) -> Result<SyncStatus, Error> {
    SyncStatus::parse(value).ok_or_raise(|| ErrorKind::InvalidData("sync status"))
}

#[derive(sqlx::FromRow)]
pub(crate) struct BookRow {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) author: String,
    pub(crate) cover_url: Option<String>,
    pub(crate) file_size: i64,
    pub(crate) updated_at: i64,
}

impl From<&BookMetadata> for BookRow {
    fn from(book: &BookMetadata) -> Self {
        Self {
            id: book.id.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            cover_url: book.cover_url.clone(),
            file_size: book.file_size,
            updated_at: book.updated_at.unix_timestamp(),
        }
    }
}

impl TryFrom<BookRow> for BookMetadata {
    type Error = Error;
    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            title: row.title,
            author: row.author,
            cover_url: row.cover_url,
            file_size: row.file_size,
            updated_at: timestamp(row.updated_at, "book updated_at")?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) book_id: String,
    pub(crate) downloaded: i64,
    pub(crate) sync_status: String,
    pub(crate) downloaded_at: Option<i64>,
    pub(crate) cached_at: i64,
}

impl From<&LibraryEntry> for EntryRow {
    fn from(entry: &LibraryEntry) -> Self {
        Self {
            id: entry.id.clone(),
            user_id: entry.user_id.clone(),
            book_id: entry.book_id.clone(),
            downloaded: i64::from(entry.downloaded),
            sync_status: entry.sync_status.as_str().to_string(),
            downloaded_at: entry.downloaded_at.map(|at| at.unix_timestamp()),
            cached_at: entry.cached_at.unix_timestamp(),
        }
    }
}

impl TryFrom<EntryRow> for LibraryEntry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            book_id: row.book_id,
            downloaded: row.downloaded != 0,
            sync_status: status(&row.sync_status)?,
            downloaded_at: row.downloaded_at.map(|at| timestamp(at, "entry downloaded_at")).transpose()?,
            cached_at: timestamp(row.cached_at, "entry cached_at")?,
        })
    }
}

/// Left-join row result for "library_entries LEFT JOIN books".
///
/// The entry side is always present; the book side is NULL when the entry
/// was cached before its catalogue record was ever fetched. Book columns
/// must be selected with a `b_` alias prefix so they don't collide with
/// the entry's own `id` and `book_id`.
pub(crate) struct RecordRow {
    pub(crate) entry: EntryRow,
    pub(crate) book: Option<BookRow>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for RecordRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        let entry = EntryRow::from_row(row)?;
        let id: Option<String> = row.try_get("b_id")?;
        let title: Option<String> = row.try_get("b_title")?;
        let author: Option<String> = row.try_get("b_author")?;
        let cover_url: Option<String> = row.try_get("b_cover_url")?;
        let file_size: Option<i64> = row.try_get("b_file_size")?;
        let updated_at: Option<i64> = row.try_get("b_updated_at")?;
        let book = match (id, title, author, file_size, updated_at) {
            (Some(id), Some(title), Some(author), Some(file_size), Some(updated_at)) => Some(BookRow {
                id,
                title,
                author,
                cover_url,
                file_size,
                updated_at,
            }),
            (None, None, None, None, None) => None,
            _ => {
                return Err(sqlx::Error::ColumnDecode {
                    index: "book columns".to_string(),
                    source: Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "LEFT JOIN book columns are partially NULL",
                    )),
                });
            },
        };
        Ok(RecordRow { entry, book })
    }
}

impl TryFrom<RecordRow> for LibraryRecord {
    type Error = Error;
    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            entry: row.entry.try_into()?,
            book: row.book.map(BookMetadata::try_from).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ChunkRow {
    pub(crate) book_id: String,
    pub(crate) chunk_idx: i64,
    pub(crate) data: Vec<u8>,
    pub(crate) sync_status: String,
    pub(crate) saved_at: i64,
}

impl TryFrom<ChunkRow> for FileChunk {
    type Error = Error;
    fn try_from(row: ChunkRow) -> Result<Self, Self::Error> {
        Ok(Self {
            book_id: row.book_id,
            chunk_idx: u32::try_from(row.chunk_idx).or_raise(|| ErrorKind::InvalidData("chunk index"))?,
            data: row.data,
            sync_status: status(&row.sync_status)?,
            saved_at: timestamp(row.saved_at, "chunk saved_at")?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct QueueRow {
    pub(crate) id: i64,
    pub(crate) mutation: String,
    pub(crate) queued_at: i64,
}

impl TryFrom<QueueRow> for QueuedMutation {
    type Error = Error;
    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let mutation: Mutation =
            serde_json::from_str(&row.mutation).or_raise(|| ErrorKind::InvalidData("queue payload"))?;
        Ok(Self {
            id: row.id,
            mutation,
            queued_at: timestamp(row.queued_at, "queue queued_at")?,
        })
    }
}
