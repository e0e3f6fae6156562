//! In-memory remote source for testing.

use async_trait::async_trait;
use shelf_store::models::{BookKind, BookMetadata, LibraryRecord};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::{ErrorKind, Result};
use crate::source::{Applied, Redemption, RemoteSource};

#[derive(Default)]
struct State {
    libraries: HashMap<String, Vec<LibraryRecord>>,
    books: Vec<BookMetadata>,
    access: HashSet<(String, String)>,
    /// Valid codes per book; consumed on first redemption.
    codes: HashMap<String, HashSet<String>>,
}

/// In-memory remote source for testing.
///
/// State lives in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. The `offline`
/// switch makes every call fail with a network error, which is how tests
/// exercise fallback-to-cache and queue-replay paths.
///
/// # Examples
///
/// ```
/// use shelf_remote::{MockRemote, RemoteSource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let remote = MockRemote::default().with_code("book-1", "GOLD42");
/// let result = remote.redeem_code("user-1", "book-1", "gold42").await?;
/// assert!(result.success);
///
/// remote.set_offline(true);
/// assert!(remote.check_access("user-1", "book-1").await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MockRemote {
    state: RwLock<State>,
    offline: AtomicBool,
    successful_calls: AtomicUsize,
}

impl MockRemote {
    /// Pre-populate a user's library.
    pub fn with_library(mut self, user_id: impl Into<String>, records: Vec<LibraryRecord>) -> Self {
        self.state.get_mut().libraries.insert(user_id.into(), records);
        self
    }

    /// Pre-populate the catalogue.
    pub fn with_books(mut self, books: Vec<BookMetadata>) -> Self {
        self.state.get_mut().books = books;
        self
    }

    /// Register a valid (not yet redeemed) access code for a book.
    pub fn with_code(mut self, book_id: impl Into<String>, code: impl Into<String>) -> Self {
        self.state.get_mut().codes.entry(book_id.into()).or_default().insert(code.into().to_uppercase());
        self
    }

    /// Simulate losing (or regaining) connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// How many calls reached the backend and succeeded.
    pub fn successful_calls(&self) -> usize {
        self.successful_calls.load(Ordering::SeqCst)
    }

    /// Whether the user holds access (test assertion helper).
    pub async fn has_access(&self, user_id: &str, book_id: &str) -> bool {
        self.state.read().await.access.contains(&(user_id.to_string(), book_id.to_string()))
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Network("simulated outage".to_string()));
        }
        Ok(())
    }

    fn record_success(&self) {
        self.successful_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteSource for MockRemote {
    async fn fetch_library(&self, user_id: &str) -> Result<Vec<LibraryRecord>> {
        self.ensure_online()?;
        let records = self.state.read().await.libraries.get(user_id).cloned().unwrap_or_default();
        self.record_success();
        Ok(records)
    }

    async fn fetch_books(&self, _kind: BookKind) -> Result<Vec<BookMetadata>> {
        self.ensure_online()?;
        let books = self.state.read().await.books.clone();
        self.record_success();
        Ok(books)
    }

    async fn check_access(&self, user_id: &str, book_id: &str) -> Result<bool> {
        self.ensure_online()?;
        let held = self.has_access(user_id, book_id).await;
        self.record_success();
        Ok(held)
    }

    async fn grant_access(&self, user_id: &str, book_id: &str, _access: BookKind) -> Result<Applied> {
        self.ensure_online()?;
        // A duplicate grant is reported as success, like the backend's
        // unique-violation handling.
        self.state.write().await.access.insert((user_id.to_string(), book_id.to_string()));
        self.record_success();
        Ok(Applied::Accepted)
    }

    async fn redeem_code(&self, user_id: &str, book_id: &str, code: &str) -> Result<Redemption> {
        self.ensure_online()?;
        let code = code.to_uppercase();
        let mut state = self.state.write().await;
        let valid = state.codes.get_mut(book_id).is_some_and(|codes| codes.remove(&code));
        if valid {
            state.access.insert((user_id.to_string(), book_id.to_string()));
        }
        drop(state);
        self.record_success();
        Ok(if valid {
            Redemption { success: true, message: "Code redeemed".to_string() }
        } else {
            Redemption { success: false, message: "Invalid or already used code".to_string() }
        })
    }

    async fn mark_downloaded(&self, user_id: &str, book_id: &str) -> Result<Applied> {
        self.ensure_online()?;
        let mut state = self.state.write().await;
        let entry = state
            .libraries
            .get_mut(user_id)
            .and_then(|records| records.iter_mut().find(|r| r.entry.book_id == book_id));
        let applied = match entry {
            Some(record) => {
                record.entry.downloaded = true;
                record.entry.downloaded_at = Some(OffsetDateTime::now_utc());
                Applied::Accepted
            },
            None => Applied::Rejected("no matching library entry".to_string()),
        };
        drop(state);
        self.record_success();
        Ok(applied)
    }
}
