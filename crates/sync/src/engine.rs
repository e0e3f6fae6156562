//! The sync engine: best-available reads, queued writes.

use shelf_remote::error::{Error as RemoteError, ErrorKind as RemoteErrorKind, Result as RemoteResult};
use shelf_remote::{Applied, RemoteHandle};
use shelf_store::Repository;
use shelf_store::models::{LibraryRecord, Mutation, SyncStatus};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, Result};
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};

/// Where a [`LibraryView`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Straight from the backend; the store was refreshed along the way.
    Live,
    /// Served from the local store because the backend was unreachable.
    Cached,
}

/// The best-available view of a user's library.
///
/// Carries enough for a UI to render its connectivity indicator:
/// "offline, 2/2 available" is `origin == Cached` plus the two counters.
#[derive(Debug, Clone)]
pub struct LibraryView {
    pub records: Vec<LibraryRecord>,
    pub origin: Origin,
}

impl LibraryView {
    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// How many records are fully usable with no network at all.
    pub fn available_offline(&self) -> usize {
        self.records.iter().filter(|r| r.available_offline()).count()
    }

    pub fn is_offline(&self) -> bool {
        self.origin == Origin::Cached
    }
}

/// Outcome of submitting a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The backend accepted it immediately.
    Applied,
    /// The backend answered and said no. Not an error: callers branch on
    /// this, they don't catch.
    Rejected(String),
    /// The backend was unreachable; the mutation sits in the queue under
    /// the returned id until [`SyncEngine::drain`] replays it.
    Queued(i64),
}

/// What a replay pass accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub replayed: usize,
    pub rejected: usize,
    /// Items still queued (the backend went unreachable mid-drain).
    pub remaining: usize,
}

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Hard deadline per remote attempt, over and above the transport's
    /// own timeout.
    pub deadline: Duration,
    /// Backoff policy for read retries. Mutations are never retried
    /// in-line; failing ones go to the queue instead.
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Reconciles the local store against the remote backend.
///
/// Owns nothing exclusive: the repository clone shares the process-wide
/// database handle and the remote is shared behind an `Arc`, so one
/// engine can serve the CLI and background tasks alike.
pub struct SyncEngine {
    repo: Repository,
    remote: RemoteHandle,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(repo: Repository, remote: RemoteHandle, options: SyncOptions) -> Self {
        Self { repo, remote, options }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Produce the best-available view of a user's library.
    ///
    /// Remote-first: a successful fetch refreshes the store wholesale and
    /// wins outright. Any remote failure (network, timeout, malformed
    /// response) falls back to the cached library. Only when the fallback
    /// itself fails does an error escape, as
    /// [`OfflineNoCache`](ErrorKind::OfflineNoCache).
    pub async fn fetch_library(&self, user_id: &str) -> Result<LibraryView> {
        match self.fetch_remote_library(user_id).await {
            Ok(records) => {
                if let Err(err) = self.persist(user_id, &records).await {
                    // StorageUnavailable is a degraded cache, not a failed
                    // fetch; the caller still gets live data.
                    warn!(user_id, error = ?err, "library fetched but not cached locally");
                }
                Ok(LibraryView { records, origin: Origin::Live })
            },
            Err(err) => {
                warn!(user_id, error = ?err, "remote fetch failed, serving cached library");
                match self.repo.library_for_user(user_id).await {
                    Ok(records) => Ok(LibraryView { records, origin: Origin::Cached }),
                    Err(store_err) => {
                        warn!(user_id, error = ?store_err, "local store unavailable as well");
                        exn::bail!(ErrorKind::OfflineNoCache)
                    },
                }
            },
        }
    }

    async fn fetch_remote_library(&self, user_id: &str) -> RemoteResult<Vec<LibraryRecord>> {
        let classify = |err: &RemoteError| {
            if err.is_retryable() { RetryAction::Retry } else { RetryAction::Abort }
        };
        retry_with_backoff(&self.options.retry, classify, || self.bounded(self.remote.fetch_library(user_id))).await
    }

    /// Write a fetched result set back into the store: book metadata
    /// wholesale, then the entries. Cross-collection ordering carries no
    /// guarantee and none is needed.
    async fn persist(&self, user_id: &str, records: &[LibraryRecord]) -> shelf_store::error::Result<()> {
        let books: Vec<_> = records.iter().filter_map(|r| r.book.clone()).collect();
        self.repo.upsert_books(&books).await?;
        let entries: Vec<_> = records.iter().map(|r| r.entry.clone()).collect();
        self.repo.save_library(user_id, &entries).await
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply a mutation remote-first.
    ///
    /// When the backend is unreachable the mutation is queued for later
    /// replay and the affected entry is marked `pending`. Only a double
    /// failure - backend unreachable *and* queue unwritable - escapes as
    /// an error, because at that point the mutation exists nowhere.
    pub async fn submit(&self, mutation: Mutation) -> Result<Submission> {
        match self.dispatch(&mutation).await {
            Ok(Applied::Accepted) => {
                self.note_applied(&mutation).await;
                Ok(Submission::Applied)
            },
            Ok(Applied::Rejected(message)) => {
                warn!(op = mutation.kind(), %message, "backend rejected mutation");
                self.note_status(&mutation, SyncStatus::Failed).await;
                Ok(Submission::Rejected(message))
            },
            Err(err) => {
                debug!(op = mutation.kind(), error = ?err, "backend unreachable, queueing mutation");
                match self.repo.enqueue(&mutation).await {
                    Ok(id) => {
                        self.note_status(&mutation, SyncStatus::Pending).await;
                        Ok(Submission::Queued(id))
                    },
                    Err(store_err) => {
                        warn!(op = mutation.kind(), error = ?store_err, "mutation lost: queue unwritable");
                        exn::bail!(ErrorKind::MutationLost)
                    },
                }
            },
        }
    }

    /// Replay queued mutations in FIFO order.
    ///
    /// An item is removed only after the backend confirmed it - applied
    /// or rejected, either is a confirmed answer. The first transport
    /// failure stops the pass; whatever is left stays queued for the next
    /// one. (A crash between "sent" and "removed" means the item replays
    /// twice; the mutation kinds are idempotent at the backend.)
    pub async fn drain(&self) -> Result<DrainReport> {
        let pending = match self.repo.pending().await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = ?err, "cannot read sync queue");
                exn::bail!(ErrorKind::QueueUnavailable)
            },
        };
        let mut report = DrainReport { remaining: pending.len(), ..DrainReport::default() };
        for item in pending {
            self.note_status(&item.mutation, SyncStatus::Syncing).await;
            match self.dispatch(&item.mutation).await {
                Ok(Applied::Accepted) => {
                    self.remove_confirmed(item.id).await?;
                    self.note_applied(&item.mutation).await;
                    report.replayed += 1;
                    report.remaining -= 1;
                },
                Ok(Applied::Rejected(message)) => {
                    warn!(id = item.id, op = item.mutation.kind(), %message, "queued mutation rejected");
                    self.remove_confirmed(item.id).await?;
                    self.note_status(&item.mutation, SyncStatus::Failed).await;
                    report.rejected += 1;
                    report.remaining -= 1;
                },
                Err(err) => {
                    info!(id = item.id, error = ?err, "backend still unreachable, stopping replay");
                    self.note_status(&item.mutation, SyncStatus::Pending).await;
                    break;
                },
            }
        }
        Ok(report)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Wrap a remote call in the engine's own deadline.
    async fn bounded<T>(&self, call: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        match tokio::time::timeout(self.options.deadline, call).await {
            Ok(result) => result,
            Err(_elapsed) => Err(exn::Exn::from(RemoteErrorKind::Timeout)),
        }
    }

    /// Exhaustive dispatch of one mutation to its backend operation.
    async fn dispatch(&self, mutation: &Mutation) -> RemoteResult<Applied> {
        self.bounded(async {
            match mutation {
                Mutation::GrantAccess { user_id, book_id, access } => {
                    self.remote.grant_access(user_id, book_id, *access).await
                },
                Mutation::RedeemCode { user_id, book_id, code } => {
                    let redemption = self.remote.redeem_code(user_id, book_id, code).await?;
                    Ok(if redemption.success {
                        Applied::Accepted
                    } else {
                        Applied::Rejected(redemption.message)
                    })
                },
                Mutation::MarkDownloaded { user_id, book_id } => {
                    self.remote.mark_downloaded(user_id, book_id).await
                },
            }
        })
        .await
    }

    /// Record a confirmed application on the local entry. Store failures
    /// here are absorbed: the remote already accepted.
    async fn note_applied(&self, mutation: &Mutation) {
        if let Mutation::MarkDownloaded { user_id, book_id } = mutation
            && let Err(err) = self.repo.mark_entry_downloaded(user_id, book_id).await
        {
            debug!(error = ?err, "could not mirror downloaded flag locally");
        }
        self.note_status(mutation, SyncStatus::Synced).await;
    }

    async fn note_status(&self, mutation: &Mutation, status: SyncStatus) {
        if let Err(err) = self.repo.set_entry_status(mutation.user_id(), mutation.book_id(), status).await {
            debug!(error = ?err, "could not record sync status");
        }
    }

    /// Removal after a confirmed backend answer. A failure here is a
    /// queue problem, not a replay problem.
    async fn remove_confirmed(&self, id: i64) -> Result<()> {
        match self.repo.remove(id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(id, error = ?err, "replayed mutation could not be removed from queue");
                exn::bail!(ErrorKind::QueueUnavailable)
            },
        }
    }
}
