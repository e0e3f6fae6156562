//! The outbound transport behind the interception layer.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};
use crate::types::{Request, Response};

/// Shared handle to a transport implementation.
pub type FetchHandle = Arc<dyn Fetch + Send + Sync>;

/// Forward a request to the actual network.
///
/// The worker owns all strategy decisions; implementations of this trait
/// only move bytes. Errors mean "the network failed", not "the server
/// said no" - a non-2xx answer is still an `Ok(Response)`.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Production transport over reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| exn::Exn::from(ErrorKind::Network(e.to_string())))?;
        Ok(Self { client })
    }

    fn transport(err: reqwest::Error) -> Error {
        if err.is_timeout() {
            exn::Exn::from(ErrorKind::Timeout)
        } else {
            exn::Exn::from(ErrorKind::Network(err.to_string()))
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self.client.request(request.method.clone(), request.url.clone());
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }
        let response = builder.send().await.map_err(Self::transport)?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        let body = response.bytes().await.map_err(Self::transport)?.to_vec();
        Ok(Response { status, content_type, body })
    }
}

/// In-memory transport for testing.
///
/// Routes are a static URL-to-response table; the `offline` switch makes
/// every fetch fail with a network error. Fetches are journaled so tests
/// can assert which strategy actually touched the network.
#[cfg(any(test, feature = "mock"))]
pub struct MockFetcher {
    routes: std::collections::HashMap<url::Url, Response>,
    offline: std::sync::atomic::AtomicBool,
    fetched: std::sync::Mutex<Vec<url::Url>>,
}

#[cfg(any(test, feature = "mock"))]
impl Default for MockFetcher {
    fn default() -> Self {
        Self {
            routes: std::collections::HashMap::new(),
            offline: std::sync::atomic::AtomicBool::new(false),
            fetched: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(any(test, feature = "mock"))]
impl MockFetcher {
    /// Register a successful route.
    pub fn with_route(mut self, url: url::Url, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(url, Response {
            status: http::StatusCode::OK,
            content_type: Some(content_type.to_string()),
            body: body.into(),
        });
        self
    }

    /// Simulate losing (or regaining) connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, std::sync::atomic::Ordering::SeqCst);
    }

    /// How many fetches reached the network for this URL.
    pub fn fetch_count(&self, url: &url::Url) -> usize {
        self.fetched.lock().expect("fetch journal poisoned").iter().filter(|u| *u == url).count()
    }
}

#[cfg(any(test, feature = "mock"))]
#[async_trait]
impl Fetch for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        if self.offline.load(std::sync::atomic::Ordering::SeqCst) {
            exn::bail!(ErrorKind::Network("simulated outage".to_string()));
        }
        self.fetched.lock().expect("fetch journal poisoned").push(request.url.clone());
        Ok(self.routes.get(&request.url).cloned().unwrap_or(Response {
            status: http::StatusCode::NOT_FOUND,
            content_type: None,
            body: Vec::new(),
        }))
    }
}
