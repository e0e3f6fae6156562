//! The interception worker: lifecycle, classification, strategies.

use http::Method;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::AssetCache;
use crate::error::Result;
use crate::fetch::FetchHandle;
use crate::types::{Request, Response};

/// Path suffixes eligible for asset caching: scripts, stylesheets and the
/// two cover-image formats the storefront serves.
pub const ASSET_EXTENSIONS: [&str; 4] = [".js", ".css", ".png", ".jpg"];

/// How a classified request will be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    NetworkFirst,
    CacheFirst,
    PassThrough,
}

/// Static configuration for one worker generation.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Origin of the hosted backend; requests to it are network-first.
    pub backend_origin: Url,
    /// Shell resources pre-cached during the install phase.
    pub shell: Vec<Url>,
    /// Version tag of the byte cache, e.g. `library-v1`. Bumping it on
    /// deployment is the sole eviction trigger for older generations.
    pub generation: String,
    /// Directory holding all cache generations.
    pub cache_root: std::path::PathBuf,
}

/// The network interception layer.
///
/// One instance per worker generation. Use [`Gateway::spawn`] to run the
/// full lifecycle on its own task; [`Gateway::handle`] is the per-request
/// core and always terminates in a [`Response`].
pub struct Gateway {
    cache: AssetCache,
    fetcher: FetchHandle,
    backend_origin: url::Origin,
    shell: Vec<Url>,
}

impl Gateway {
    pub async fn new(config: GatewayConfig, fetcher: FetchHandle) -> Result<Self> {
        let cache = AssetCache::open(config.cache_root, config.generation).await?;
        Ok(Self {
            cache,
            fetcher,
            backend_origin: config.backend_origin.origin(),
            shell: config.shell,
        })
    }

    /// Install phase: pre-populate the byte cache with the shell.
    ///
    /// Partial shell caching must not abort installation, so every
    /// failure here is logged and swallowed.
    pub async fn install(&self) {
        info!(generation = self.cache.generation(), "caching app shell");
        for url in &self.shell {
            match self.fetcher.fetch(&Request::get(url.clone())).await {
                Ok(response) if response.is_success() => {
                    if let Err(err) = self.cache.put(url, &response).await {
                        warn!(%url, error = ?err, "shell resource could not be cached");
                    }
                },
                Ok(response) => {
                    warn!(%url, status = %response.status, "shell resource not cacheable");
                },
                Err(err) => {
                    warn!(%url, error = ?err, "shell resource fetch failed");
                },
            }
        }
    }

    /// Activate phase: generation rollover.
    ///
    /// Deletes every cache generation whose tag differs from the current
    /// one, then the worker serves immediately - no waiting for clients
    /// to reload.
    pub async fn activate(&self) {
        match self.cache.generations().await {
            Ok(tags) => {
                for tag in tags.iter().filter(|tag| tag.as_str() != self.cache.generation()) {
                    info!(tag, "deleting old cache generation");
                    if let Err(err) = self.cache.remove_generation(tag).await {
                        warn!(tag, error = ?err, "old generation could not be deleted");
                    }
                }
            },
            Err(err) => warn!(error = ?err, "could not enumerate cache generations"),
        }
    }

    fn classify(&self, request: &Request) -> Strategy {
        if request.method != Method::GET {
            return Strategy::PassThrough;
        }
        if request.url.origin() == self.backend_origin {
            Strategy::NetworkFirst
        } else {
            Strategy::CacheFirst
        }
    }

    fn cacheable_asset(url: &Url) -> bool {
        ASSET_EXTENSIONS.iter().any(|ext| url.path().ends_with(ext))
    }

    /// Answer one intercepted request.
    ///
    /// Terminal state is always a response; this function cannot fail.
    pub async fn handle(&self, request: &Request) -> Response {
        match self.classify(request) {
            Strategy::PassThrough => self.pass_through(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
        }
    }

    /// Non-GET traffic: forwarded untouched, never cached, never given an
    /// offline fallback.
    async fn pass_through(&self, request: &Request) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(err) => {
                debug!(url = %request.url, error = ?err, "pass-through request failed");
                Response::bad_gateway()
            },
        }
    }

    /// Backend traffic: live data wins; the cache catches the fall.
    async fn network_first(&self, request: &Request) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success()
                    && let Err(err) = self.cache.put(&request.url, &response).await
                {
                    debug!(url = %request.url, error = ?err, "response not cached");
                }
                response
            },
            Err(err) => {
                debug!(url = %request.url, error = ?err, "backend unreachable, trying byte cache");
                match self.cache.get(&request.url).await {
                    Ok(Some(cached)) => cached,
                    // A cache failure reads as a miss, never as a crash.
                    Ok(None) | Err(_) => Response::offline_backend(),
                }
            },
        }
    }

    /// Asset traffic: the cached copy wins; the network fills misses.
    async fn cache_first(&self, request: &Request) -> Response {
        if let Ok(Some(cached)) = self.cache.get(&request.url).await {
            return cached;
        }
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success()
                    && Self::cacheable_asset(&request.url)
                    && let Err(err) = self.cache.put(&request.url, &response).await
                {
                    debug!(url = %request.url, error = ?err, "asset not cached");
                }
                response
            },
            Err(err) => {
                debug!(url = %request.url, error = ?err, "asset unreachable with no cached copy");
                Response::offline_asset()
            },
        }
    }

    /// Run the full lifecycle on a dedicated task: install, activate,
    /// then serve until every [`GatewayHandle`] is dropped.
    ///
    /// The worker owns all of its state; the application side talks to it
    /// only through the returned handle's request/response channel.
    pub fn spawn(self) -> (GatewayHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(32);
        let task = tokio::spawn(async move {
            self.install().await;
            self.activate().await;
            while let Some(Job { request, reply }) = rx.recv().await {
                let response = self.handle(&request).await;
                // A dropped reply half means the requester went away;
                // nothing to answer anymore.
                let _ = reply.send(response);
            }
        });
        (GatewayHandle { tx }, task)
    }
}

struct Job {
    request: Request,
    reply: oneshot::Sender<Response>,
}

/// Application-side handle to a spawned worker.
///
/// Cheap to clone; the worker stops once all clones are dropped.
#[derive(Clone)]
pub struct GatewayHandle {
    tx: mpsc::Sender<Job>,
}

impl GatewayHandle {
    /// Send a request through the interception layer and await its
    /// response.
    ///
    /// If the worker is gone a plain 503 is synthesized, honouring the
    /// "every request gets answered" contract even at shutdown.
    pub async fn intercept(&self, request: Request) -> Response {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Job { request, reply }).await.is_err() {
            return Response::offline_asset();
        }
        rx.await.unwrap_or_else(|_| Response::offline_asset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockFetcher;
    use http::StatusCode;
    use std::sync::Arc;

    const BACKEND: &str = "https://backend.example.com";
    const SITE: &str = "https://library.example.org";

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn config(root: &std::path::Path, generation: &str) -> GatewayConfig {
        GatewayConfig {
            backend_origin: url(BACKEND),
            shell: vec![url(&format!("{SITE}/")), url(&format!("{SITE}/index.html")), url(&format!("{SITE}/manifest.json"))],
            generation: generation.to_string(),
            cache_root: root.to_path_buf(),
        }
    }

    async fn gateway(root: &std::path::Path, fetcher: Arc<MockFetcher>) -> Gateway {
        Gateway::new(config(root, "library-v1"), fetcher).await.unwrap()
    }

    #[tokio::test]
    async fn test_backend_get_is_network_first() {
        let dir = tempfile::tempdir().unwrap();
        let api = url(&format!("{BACKEND}/rest/v1/books"));
        let fetcher = Arc::new(MockFetcher::default().with_route(api.clone(), "application/json", b"[]".to_vec()));
        let gateway = gateway(dir.path(), fetcher.clone()).await;

        // Online: the live response is returned and a copy is cached.
        let live = gateway.handle(&Request::get(api.clone())).await;
        assert_eq!(live.status, StatusCode::OK);
        assert_eq!(fetcher.fetch_count(&api), 1);

        // Offline: the cached copy answers.
        fetcher.set_offline(true);
        let cached = gateway.handle(&Request::get(api.clone())).await;
        assert_eq!(cached.body, b"[]");
    }

    #[tokio::test]
    async fn test_backend_offline_without_cache_synthesizes_json_503() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetcher::default());
        let gateway = gateway(dir.path(), fetcher.clone()).await;
        fetcher.set_offline(true);
        let response = gateway.handle(&Request::get(url(&format!("{BACKEND}/rest/v1/books")))).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        let value: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(value["error"], "Offline");
    }

    #[tokio::test]
    async fn test_same_origin_png_is_cache_first() {
        let dir = tempfile::tempdir().unwrap();
        let cover = url(&format!("{SITE}/covers/book.png"));
        let fetcher = Arc::new(MockFetcher::default().with_route(cover.clone(), "image/png", b"PNG".to_vec()));
        let gateway = gateway(dir.path(), fetcher.clone()).await;

        let first = gateway.handle(&Request::get(cover.clone())).await;
        assert!(first.is_success());
        assert_eq!(fetcher.fetch_count(&cover), 1);

        // Second request is served from the byte cache without a fetch.
        let second = gateway.handle(&Request::get(cover.clone())).await;
        assert_eq!(second.body, b"PNG");
        assert_eq!(fetcher.fetch_count(&cover), 1);
    }

    #[tokio::test]
    async fn test_unlisted_extension_is_fetched_but_never_cached() {
        let dir = tempfile::tempdir().unwrap();
        let page = url(&format!("{SITE}/about.html"));
        let fetcher = Arc::new(MockFetcher::default().with_route(page.clone(), "text/html", b"<html>".to_vec()));
        let gateway = gateway(dir.path(), fetcher.clone()).await;
        gateway.handle(&Request::get(page.clone())).await;
        gateway.handle(&Request::get(page.clone())).await;
        assert_eq!(fetcher.fetch_count(&page), 2);
    }

    #[tokio::test]
    async fn test_asset_offline_without_cache_synthesizes_text_503() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetcher::default());
        let gateway = gateway(dir.path(), fetcher.clone()).await;
        fetcher.set_offline(true);
        let response = gateway.handle(&Request::get(url(&format!("{SITE}/app.js")))).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body, b"Offline");
    }

    #[tokio::test]
    async fn test_post_passes_through_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let api = url(&format!("{BACKEND}/rest/v1/user_book_access"));
        let fetcher = Arc::new(MockFetcher::default().with_route(api.clone(), "application/json", b"{}".to_vec()));
        let gateway = gateway(dir.path(), fetcher.clone()).await;

        let online = gateway.handle(&Request::post(api.clone(), b"{}".to_vec())).await;
        assert!(online.is_success());
        // Nothing was cached for the POST...
        assert!(gateway.cache.get(&api).await.unwrap().is_none());

        // ...so going offline yields no offline fallback, only a 502.
        fetcher.set_offline(true);
        let offline = gateway.handle(&Request::post(api.clone(), b"{}".to_vec())).await;
        assert_eq!(offline.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_install_tolerates_partial_shell_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root_doc = url(&format!("{SITE}/"));
        // Only one of the three shell resources resolves.
        let fetcher = Arc::new(MockFetcher::default().with_route(root_doc.clone(), "text/html", b"<html>".to_vec()));
        let gateway = gateway(dir.path(), fetcher).await;
        gateway.install().await;
        assert!(gateway.cache.get(&root_doc).await.unwrap().is_some());
        assert!(gateway.cache.get(&url(&format!("{SITE}/manifest.json"))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_rolls_over_cache_generations() {
        let dir = tempfile::tempdir().unwrap();
        let stale = url(&format!("{SITE}/old.js"));
        let fresh = url(&format!("{SITE}/app.js"));

        // A previous generation holds an entry.
        let old_cache = AssetCache::open(dir.path(), "library-v0").await.unwrap();
        old_cache
            .put(&stale, &Response {
                status: StatusCode::OK,
                content_type: None,
                body: b"old".to_vec(),
            })
            .await
            .unwrap();

        let fetcher = Arc::new(MockFetcher::default().with_route(fresh.clone(), "text/javascript", b"new".to_vec()));
        let gateway = gateway(dir.path(), fetcher).await;
        gateway.handle(&Request::get(fresh.clone())).await;
        gateway.activate().await;

        // The old generation is unreachable; the current one persists.
        let mut tags = gateway.cache.generations().await.unwrap();
        tags.sort();
        assert_eq!(tags, vec!["library-v1"]);
        assert!(old_cache.get(&stale).await.unwrap().is_none());
        assert!(gateway.cache.get(&fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_spawned_worker_answers_over_the_channel() {
        let dir = tempfile::tempdir().unwrap();
        let cover = url(&format!("{SITE}/covers/book.jpg"));
        let fetcher = Arc::new(MockFetcher::default().with_route(cover.clone(), "image/jpeg", b"JPG".to_vec()));
        let gateway = gateway(dir.path(), fetcher).await;
        let (handle, task) = gateway.spawn();

        let response = handle.intercept(Request::get(cover)).await;
        assert_eq!(response.body, b"JPG");

        drop(handle);
        task.await.unwrap();
    }
}
