//! Generation-tagged byte cache on the local filesystem.
//!
//! Layout: one directory per generation under a common root, e.g.
//! `<root>/library-v1/`. An entry is two files keyed by the BLAKE3 hex of
//! the exact request URL: `<key>.body` holds the payload and `<key>.json`
//! a small metadata sidecar. The sidecar is written last, so a torn write
//! leaves a body without a sidecar - an invisible entry, not a corrupt
//! one.
//!
//! There is no per-entry eviction. The sole eviction trigger is bumping
//! the generation tag: the activate phase deletes every directory whose
//! name differs from the current tag.

use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::OffsetDateTime;
use tokio::fs;
use url::Url;

use crate::error::{ErrorKind, Result};
use crate::types::Response;

/// Metadata sidecar stored next to each cached body.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    url: String,
    status: u16,
    content_type: Option<String>,
    stored_at: i64,
}

/// Byte cache for one generation, with visibility into its siblings.
#[derive(Debug, Clone)]
pub struct AssetCache {
    root: PathBuf,
    generation: String,
}

impl AssetCache {
    /// Open (creating if absent) the cache directory for a generation.
    pub async fn open(root: impl Into<PathBuf>, generation: impl Into<String>) -> Result<Self> {
        let cache = Self { root: root.into(), generation: generation.into() };
        fs::create_dir_all(cache.dir()).await.map_err(ErrorKind::Cache)?;
        Ok(cache)
    }

    /// The version tag this cache writes under.
    pub fn generation(&self) -> &str {
        &self.generation
    }

    fn dir(&self) -> PathBuf {
        self.root.join(&self.generation)
    }

    fn entry_paths(&self, url: &Url) -> (PathBuf, PathBuf) {
        let key = blake3::hash(url.as_str().as_bytes()).to_hex();
        let dir = self.dir();
        (dir.join(format!("{key}.body")), dir.join(format!("{key}.json")))
    }

    /// Store a response under the exact request URL, replacing any
    /// previous copy (last write wins).
    pub async fn put(&self, url: &Url, response: &Response) -> Result<()> {
        let (body_path, sidecar_path) = self.entry_paths(url);
        let sidecar = Sidecar {
            url: url.to_string(),
            status: response.status.as_u16(),
            content_type: response.content_type.clone(),
            stored_at: OffsetDateTime::now_utc().unix_timestamp(),
        };
        let encoded = serde_json::to_vec(&sidecar).or_raise(|| ErrorKind::InvalidEntry)?;
        fs::write(&body_path, &response.body).await.map_err(ErrorKind::Cache)?;
        // Sidecar last: its presence is the commit marker.
        fs::write(&sidecar_path, encoded).await.map_err(ErrorKind::Cache)?;
        Ok(())
    }

    /// Look up a cached response; `None` on miss.
    pub async fn get(&self, url: &Url) -> Result<Option<Response>> {
        let (body_path, sidecar_path) = self.entry_paths(url);
        let encoded = match fs::read(&sidecar_path).await {
            Ok(encoded) => encoded,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(exn::Exn::from(ErrorKind::from(err))),
        };
        let sidecar: Sidecar = serde_json::from_slice(&encoded).or_raise(|| ErrorKind::InvalidEntry)?;
        let body = match fs::read(&body_path).await {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(exn::Exn::from(ErrorKind::from(err))),
        };
        let status = http::StatusCode::from_u16(sidecar.status).or_raise(|| ErrorKind::InvalidEntry)?;
        Ok(Some(Response {
            status,
            content_type: sidecar.content_type,
            body,
        }))
    }

    /// Every generation tag currently on disk, this cache's included.
    pub async fn generations(&self) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(tags),
            Err(err) => return Err(exn::Exn::from(ErrorKind::from(err))),
        };
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Cache)? {
            let is_dir = entry.file_type().await.map_err(ErrorKind::Cache)?.is_dir();
            if is_dir && let Ok(name) = entry.file_name().into_string() {
                tags.push(name);
            }
        }
        Ok(tags)
    }

    /// Delete one generation wholesale.
    ///
    /// Idempotent: a tag that is already gone is not an error.
    pub async fn remove_generation(&self, tag: &str) -> Result<()> {
        match fs::remove_dir_all(self.root.join(tag)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(exn::Exn::from(ErrorKind::from(err))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn response(body: &[u8]) -> Response {
        Response {
            status: StatusCode::OK,
            content_type: Some("application/octet-stream".to_string()),
            body: body.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::open(dir.path(), "library-v1").await.unwrap();
        let target = url("https://cdn.example.com/app.js");
        cache.put(&target, &response(b"console.log(1)")).await.unwrap();
        let cached = cache.get(&target).await.unwrap().unwrap();
        assert_eq!(cached.body, b"console.log(1)");
        assert_eq!(cached.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_miss_is_none_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::open(dir.path(), "library-v1").await.unwrap();
        assert!(cache.get(&url("https://cdn.example.com/missing.js")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_previous_copy() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::open(dir.path(), "library-v1").await.unwrap();
        let target = url("https://cdn.example.com/style.css");
        cache.put(&target, &response(b"old")).await.unwrap();
        cache.put(&target, &response(b"new")).await.unwrap();
        assert_eq!(cache.get(&target).await.unwrap().unwrap().body, b"new");
    }

    #[tokio::test]
    async fn test_distinct_urls_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::open(dir.path(), "library-v1").await.unwrap();
        cache.put(&url("https://a.example.com/x"), &response(b"a")).await.unwrap();
        cache.put(&url("https://b.example.com/x"), &response(b"b")).await.unwrap();
        assert_eq!(cache.get(&url("https://a.example.com/x")).await.unwrap().unwrap().body, b"a");
        assert_eq!(cache.get(&url("https://b.example.com/x")).await.unwrap().unwrap().body, b"b");
    }

    #[tokio::test]
    async fn test_generations_lists_sibling_directories() {
        let dir = tempfile::tempdir().unwrap();
        let old = AssetCache::open(dir.path(), "library-v1").await.unwrap();
        let new = AssetCache::open(dir.path(), "library-v2").await.unwrap();
        let mut tags = new.generations().await.unwrap();
        tags.sort();
        assert_eq!(tags, vec!["library-v1", "library-v2"]);
        drop(old);
    }

    #[tokio::test]
    async fn test_remove_generation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AssetCache::open(dir.path(), "library-v1").await.unwrap();
        cache.remove_generation("library-v0").await.unwrap();
        cache.remove_generation("library-v1").await.unwrap();
        cache.remove_generation("library-v1").await.unwrap();
    }
}
