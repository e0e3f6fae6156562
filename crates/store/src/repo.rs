//! Repository over the four collections of the local store.
//!
//! One repository rather than four: the collections are small and the sync
//! engine touches most of them in a single read/write cycle. Writes within
//! one collection are serialized by SQLite's transaction semantics; cross-
//! collection operations carry no ordering guarantee relative to each
//! other.

use exn::ResultExt;
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::row::{BookRow, ChunkRow, EntryRow, QueueRow, RecordRow};
use crate::models::{
    BookMetadata, FileChunk, LibraryEntry, LibraryRecord, Mutation, QueuedMutation, SyncStatus,
};

/// Repository for library state, file chunks and the sync queue.
///
/// Cheap to clone; clones share the connection pool of the [`Database`]
/// they came from.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Books
    // =========================================================================

    /// Replace cached metadata for each given book.
    ///
    /// A record is the unit of truth: an existing row with the same id is
    /// overwritten wholesale, never merged field-by-field.
    pub async fn upsert_books(&self, books: &[BookMetadata]) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Unavailable)?;
        for book in books {
            let row = BookRow::from(book);
            sqlx::query(include_str!("../queries/upsert_book.sql"))
                .bind(row.id)
                .bind(row.title)
                .bind(row.author)
                .bind(row.cover_url)
                .bind(row.file_size)
                .bind(row.updated_at)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Unavailable)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Unavailable)?;
        Ok(())
    }

    /// Get cached metadata for one book.
    pub async fn book(&self, id: &str) -> Result<Option<BookMetadata>> {
        let row: Option<BookRow> = sqlx::query_as(include_str!("../queries/get_book.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        row.map(BookMetadata::try_from).transpose()
    }

    /// List all cached book metadata, most recently updated first.
    pub async fn list_books(&self) -> Result<Vec<BookMetadata>> {
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/list_books.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        rows.into_iter().map(BookMetadata::try_from).collect()
    }

    // =========================================================================
    // Library entries
    // =========================================================================

    /// Upsert the given entries under `user_id`, stamping `cached_at` with
    /// the current time.
    ///
    /// Entries absent from the incoming set are left untouched - callers
    /// must reconcile deletions separately (a documented limitation of the
    /// sync model).
    pub async fn save_library(&self, user_id: &str, entries: &[LibraryEntry]) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Unavailable)?;
        for entry in entries {
            let row = EntryRow::from(entry);
            sqlx::query(include_str!("../queries/upsert_entry.sql"))
                .bind(row.id)
                .bind(user_id)
                .bind(row.book_id)
                .bind(row.downloaded)
                .bind(row.sync_status)
                .bind(row.downloaded_at)
                .bind(now)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Unavailable)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Unavailable)?;
        Ok(())
    }

    /// All entries for a user, joined with whatever book metadata the
    /// store holds.
    ///
    /// Row order is unspecified; callers sort if order matters.
    pub async fn library_for_user(&self, user_id: &str) -> Result<Vec<LibraryRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(include_str!("../queries/library_for_user.sql"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        rows.into_iter().map(LibraryRecord::try_from).collect()
    }

    /// Entries in a given sync state, across all users.
    ///
    /// The `failed` bucket is what a UI retry affordance renders.
    pub async fn entries_with_status(&self, status: SyncStatus) -> Result<Vec<LibraryEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/entries_with_status.sql"))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        rows.into_iter().map(LibraryEntry::try_from).collect()
    }

    /// Entries whose `cached_at` is older than the cutoff.
    ///
    /// Enumeration only - this is the hook a future eviction pass would
    /// build on; nothing in the core deletes entries.
    pub async fn entries_cached_before(&self, cutoff: OffsetDateTime) -> Result<Vec<LibraryEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/entries_cached_before.sql"))
            .bind(cutoff.unix_timestamp())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        rows.into_iter().map(LibraryEntry::try_from).collect()
    }

    /// Move a (user, book) entry to a new sync state.
    ///
    /// Returns `false` if no such entry exists.
    pub async fn set_entry_status(&self, user_id: &str, book_id: &str, status: SyncStatus) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/set_entry_status.sql"))
            .bind(status.as_str())
            .bind(OffsetDateTime::now_utc().unix_timestamp())
            .bind(user_id)
            .bind(book_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    /// Flip an entry's `downloaded` flag after its chunks finished
    /// landing locally.
    ///
    /// Returns `false` if no such entry exists.
    pub async fn mark_entry_downloaded(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let result = sqlx::query(include_str!("../queries/mark_entry_downloaded.sql"))
            .bind(now)
            .bind(now)
            .bind(user_id)
            .bind(book_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // File chunks
    // =========================================================================

    /// Upsert one chunk of a book's file content.
    ///
    /// Re-downloading a chunk is idempotent: a second write to the same
    /// `(book_id, chunk_idx)` silently replaces the first.
    pub async fn save_chunk(&self, book_id: &str, chunk_idx: u32, data: &[u8]) -> Result<()> {
        sqlx::query(include_str!("../queries/upsert_chunk.sql"))
            .bind(book_id)
            .bind(i64::from(chunk_idx))
            .bind(data)
            .bind(SyncStatus::Synced.as_str())
            .bind(OffsetDateTime::now_utc().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        Ok(())
    }

    /// Get a single chunk by its composite key.
    pub async fn chunk(&self, book_id: &str, chunk_idx: u32) -> Result<Option<FileChunk>> {
        let row: Option<ChunkRow> = sqlx::query_as(include_str!("../queries/get_chunk.sql"))
            .bind(book_id)
            .bind(i64::from(chunk_idx))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        row.map(FileChunk::try_from).transpose()
    }

    /// All chunks for a book in ascending index order.
    pub async fn chunks_for_book(&self, book_id: &str) -> Result<Vec<FileChunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(include_str!("../queries/chunks_for_book.sql"))
            .bind(book_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        rows.into_iter().map(FileChunk::try_from).collect()
    }

    /// Total bytes downloaded for a book: the sum of its chunk payloads,
    /// computed on demand.
    ///
    /// Returns 0 for a book with no chunks; an unknown id is not an error.
    pub async fn file_size(&self, book_id: &str) -> Result<u64> {
        let size: i64 = sqlx::query_scalar(include_str!("../queries/file_size.sql"))
            .bind(book_id)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        u64::try_from(size).or_raise(|| ErrorKind::InvalidData("file size"))
    }

    // =========================================================================
    // Sync queue
    // =========================================================================

    /// Append a mutation to the sync queue.
    ///
    /// Never overwrites; returns the auto-assigned id that fixes the
    /// mutation's position in replay order.
    pub async fn enqueue(&self, mutation: &Mutation) -> Result<i64> {
        let payload = serde_json::to_string(mutation).or_raise(|| ErrorKind::InvalidData("queue payload"))?;
        let result = sqlx::query(include_str!("../queries/enqueue_mutation.sql"))
            .bind(payload)
            .bind(OffsetDateTime::now_utc().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        Ok(result.last_insert_rowid())
    }

    /// All mutations still waiting for replay, in FIFO order.
    pub async fn pending(&self) -> Result<Vec<QueuedMutation>> {
        let rows: Vec<QueueRow> = sqlx::query_as(include_str!("../queries/pending_mutations.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        rows.into_iter().map(QueuedMutation::try_from).collect()
    }

    /// Remove a queue item after its remote application was confirmed.
    ///
    /// Idempotent: removing an id that is already gone is not an error.
    pub async fn remove(&self, id: i64) -> Result<()> {
        sqlx::query(include_str!("../queries/remove_mutation.sql"))
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookKind;

    async fn repo() -> (Database, Repository) {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        (db, repo)
    }

    fn book(id: &str) -> BookMetadata {
        BookMetadata {
            id: id.to_string(),
            title: format!("Title {id}"),
            author: "Some Author".to_string(),
            cover_url: Some(format!("https://cdn.example/covers/{id}.jpg")),
            file_size: 4096,
            updated_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        }
    }

    fn entry(id: &str, user_id: &str, book_id: &str) -> LibraryEntry {
        LibraryEntry {
            id: id.to_string(),
            user_id: user_id.to_string(),
            book_id: book_id.to_string(),
            downloaded: false,
            sync_status: SyncStatus::Synced,
            downloaded_at: None,
            cached_at: OffsetDateTime::from_unix_timestamp(0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_save_and_read_library() {
        let (_db, repo) = repo().await;
        repo.upsert_books(&[book("a"), book("b")]).await.unwrap();
        repo.save_library("user-1", &[entry("e1", "user-1", "a"), entry("e2", "user-1", "b")]).await.unwrap();
        let records = repo.library_for_user("user-1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.book.is_some()));
    }

    #[tokio::test]
    async fn test_library_for_unknown_user_is_empty() {
        let (_db, repo) = repo().await;
        assert!(repo.library_for_user("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_library_does_not_delete_absent_entries() {
        let (_db, repo) = repo().await;
        repo.save_library("u", &[entry("e1", "u", "a"), entry("e2", "u", "b")]).await.unwrap();
        // A second save with only one entry leaves the other in place.
        let mut changed = entry("e1", "u", "a");
        changed.downloaded = true;
        repo.save_library("u", &[changed]).await.unwrap();
        let records = repo.library_for_user("u").await.unwrap();
        assert_eq!(records.len(), 2);
        let e1 = records.iter().find(|r| r.entry.id == "e1").unwrap();
        assert!(e1.entry.downloaded);
    }

    #[tokio::test]
    async fn test_save_library_stamps_cached_at() {
        let (_db, repo) = repo().await;
        let before = OffsetDateTime::now_utc().unix_timestamp();
        // The incoming entry claims the epoch; the store re-stamps it.
        repo.save_library("u", &[entry("e1", "u", "a")]).await.unwrap();
        let records = repo.library_for_user("u").await.unwrap();
        assert!(records[0].entry.cached_at.unix_timestamp() >= before);
    }

    #[tokio::test]
    async fn test_entry_without_cached_book_metadata() {
        let (_db, repo) = repo().await;
        repo.save_library("u", &[entry("e1", "u", "never-fetched")]).await.unwrap();
        let records = repo.library_for_user("u").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].book.is_none());
    }

    #[tokio::test]
    async fn test_book_metadata_replaced_wholesale() {
        let (_db, repo) = repo().await;
        repo.upsert_books(&[book("a")]).await.unwrap();
        let mut refreshed = book("a");
        refreshed.title = "New Title".to_string();
        refreshed.cover_url = None;
        repo.upsert_books(&[refreshed.clone()]).await.unwrap();
        let stored = repo.book("a").await.unwrap().unwrap();
        assert_eq!(stored, refreshed);
    }

    #[tokio::test]
    async fn test_status_index_and_transitions() {
        let (_db, repo) = repo().await;
        repo.save_library("u", &[entry("e1", "u", "a"), entry("e2", "u", "b")]).await.unwrap();
        assert!(repo.set_entry_status("u", "a", SyncStatus::Failed).await.unwrap());
        let failed = repo.entries_with_status(SyncStatus::Failed).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].book_id, "a");
        // No matching entry: reported, not an error.
        assert!(!repo.set_entry_status("u", "missing", SyncStatus::Failed).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_entry_downloaded() {
        let (_db, repo) = repo().await;
        repo.save_library("u", &[entry("e1", "u", "a")]).await.unwrap();
        assert!(repo.mark_entry_downloaded("u", "a").await.unwrap());
        let records = repo.library_for_user("u").await.unwrap();
        assert!(records[0].entry.downloaded);
        assert!(records[0].entry.downloaded_at.is_some());
    }

    #[tokio::test]
    async fn test_chunk_write_is_idempotent_last_write_wins() {
        let (_db, repo) = repo().await;
        repo.save_chunk("a", 0, &[1u8; 100]).await.unwrap();
        repo.save_chunk("a", 0, &[2u8; 64]).await.unwrap();
        let chunks = repo.chunks_for_book("a").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].data, vec![2u8; 64]);
        assert_eq!(repo.file_size("a").await.unwrap(), 64);
    }

    #[tokio::test]
    async fn test_file_size_sums_chunks_regardless_of_write_order() {
        let (_db, repo) = repo().await;
        repo.save_chunk("a", 2, &vec![0u8; 512]).await.unwrap();
        repo.save_chunk("a", 0, &vec![0u8; 1024]).await.unwrap();
        repo.save_chunk("a", 1, &vec![0u8; 2048]).await.unwrap();
        // Another book's chunks don't leak into the sum.
        repo.save_chunk("b", 0, &vec![0u8; 9000]).await.unwrap();
        assert_eq!(repo.file_size("a").await.unwrap(), 3584);
    }

    #[tokio::test]
    async fn test_file_size_unknown_book_is_zero() {
        let (_db, repo) = repo().await;
        assert_eq!(repo.file_size("no-such-book").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_chunks_come_back_in_index_order() {
        let (_db, repo) = repo().await;
        repo.save_chunk("a", 1, b"mid").await.unwrap();
        repo.save_chunk("a", 2, b"end").await.unwrap();
        repo.save_chunk("a", 0, b"start").await.unwrap();
        let indices: Vec<u32> = repo.chunks_for_book("a").await.unwrap().iter().map(|c| c.chunk_idx).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_queue_is_fifo_and_drains_clean() {
        let (_db, repo) = repo().await;
        let first = Mutation::GrantAccess {
            user_id: "u".into(),
            book_id: "a".into(),
            access: BookKind::Free,
        };
        let second = Mutation::RedeemCode {
            user_id: "u".into(),
            book_id: "b".into(),
            code: "XYZ789".into(),
        };
        let third = Mutation::MarkDownloaded { user_id: "u".into(), book_id: "a".into() };
        let id1 = repo.enqueue(&first).await.unwrap();
        let id2 = repo.enqueue(&second).await.unwrap();
        let id3 = repo.enqueue(&third).await.unwrap();
        assert!(id1 < id2 && id2 < id3);

        let pending = repo.pending().await.unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].mutation, first);
        assert_eq!(pending[1].mutation, second);
        assert_eq!(pending[2].mutation, third);

        for item in pending {
            repo.remove(item.id).await.unwrap();
        }
        assert!(repo.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_absent_queue_item_is_not_an_error() {
        let (_db, repo) = repo().await;
        repo.remove(42).await.unwrap();
    }

    #[tokio::test]
    async fn test_entries_cached_before_cutoff() {
        let (_db, repo) = repo().await;
        repo.save_library("u", &[entry("e1", "u", "a")]).await.unwrap();
        let future = OffsetDateTime::now_utc() + time::Duration::hours(1);
        let past = OffsetDateTime::from_unix_timestamp(1000).unwrap();
        assert_eq!(repo.entries_cached_before(future).await.unwrap().len(), 1);
        assert!(repo.entries_cached_before(past).await.unwrap().is_empty());
    }
}
