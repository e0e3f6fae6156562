use time::OffsetDateTime;

use crate::models::SyncStatus;

/// One bounded-size slice of a downloaded file.
///
/// Chunks are additive and individually last-write-wins; nothing at this
/// level records how many chunks a complete file has. Whether a book is
/// *fully* downloaded is not decidable here - the backend does not publish
/// an expected chunk count, and the store deliberately does not invent one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub book_id: String,
    pub chunk_idx: u32,
    pub data: Vec<u8>,
    pub sync_status: SyncStatus,
    pub saved_at: OffsetDateTime,
}

impl FileChunk {
    /// Size of this chunk's payload in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
