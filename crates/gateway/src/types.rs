//! Request and response types crossing the interception boundary.
//!
//! Deliberately minimal: the worker classifies on method and URL, and a
//! cached response needs nothing beyond status, content type and bytes.

use http::{Method, StatusCode};
use url::Url;

/// An intercepted outbound request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub body: Vec<u8>,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self { method: Method::GET, url, body: Vec::new() }
    }

    pub fn post(url: Url, body: impl Into<Vec<u8>>) -> Self {
        Self { method: Method::POST, url, body: body.into() }
    }
}

/// The response a request terminates with.
///
/// Every intercepted request ends in exactly one of these - live, cached,
/// or synthesized. The worker never leaves a request unanswered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Synthesized answer for an unreachable backend with no cached copy.
    pub(crate) fn offline_backend() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            content_type: Some("application/json".to_string()),
            body: br#"{"error":"Offline"}"#.to_vec(),
        }
    }

    /// Synthesized answer for an unreachable asset with no cached copy.
    pub(crate) fn offline_asset() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            content_type: Some("text/plain".to_string()),
            body: b"Offline".to_vec(),
        }
    }

    /// Synthesized answer when a pass-through request cannot be forwarded.
    ///
    /// Pass-throughs are not offline-eligible, so a 503 "Offline" would be
    /// misleading; 502 says "the forwarding hop failed", which is the truth.
    pub(crate) fn bad_gateway() -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            content_type: Some("text/plain".to_string()),
            body: b"Bad Gateway".to_vec(),
        }
    }
}
