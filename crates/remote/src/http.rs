//! HTTP implementation of [`RemoteSource`] over the hosted row API.
//!
//! Tables are addressed as `rest/v1/<table>` with predicate query
//! parameters (`user_id=eq.<id>`), procedures as `rest/v1/rpc/<name>`.
//! Authentication is a static api key sent both as the `apikey` header
//! and as a bearer token.

use async_trait::async_trait;
use exn::ResultExt;
use serde_json::json;
use shelf_store::models::{BookKind, BookMetadata, LibraryRecord};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use url::Url;

use crate::error::{Error, ErrorKind, Result};
use crate::rows::{AccessRow, LibraryRow, RedemptionRow};
use crate::source::{Applied, Redemption, RemoteSource};

/// Columns requested for the library join; mirrors what the storefront UI
/// renders, nothing more.
const LIBRARY_SELECT: &str =
    "id,book_id,downloaded,sync_status,downloaded_at,books(id,title,author,cover_url,file_size,updated_at)";

/// HTTP client for the hosted backend.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base: Url,
    api_key: String,
}

impl HttpRemote {
    /// Create a client rooted at the backend's base URL.
    ///
    /// The transport timeout is the only deadline this layer owns; the
    /// sync engine wraps calls in its own, tighter deadline.
    pub fn new(base: Url, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        if base.cannot_be_a_base() {
            exn::bail!(ErrorKind::InvalidEndpoint(base.to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| exn::Exn::from(ErrorKind::Network(e.to_string())))?;
        Ok(Self { client, base, api_key: api_key.into() })
    }

    fn table(&self, name: &str) -> Url {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .expect("base validated in constructor")
            .pop_if_empty()
            .extend(["rest", "v1", name]);
        url
    }

    fn rpc(&self, name: &str) -> Url {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .expect("base validated in constructor")
            .pop_if_empty()
            .extend(["rest", "v1", "rpc", name]);
        url
    }

    fn transport(err: reqwest::Error) -> Error {
        if err.is_timeout() {
            exn::Exn::from(ErrorKind::Timeout)
        } else {
            exn::Exn::from(ErrorKind::Network(err.to_string()))
        }
    }

    async fn describe(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        format!("{status}: {body}")
    }

    /// GET a list of rows, classifying non-2xx answers.
    async fn rows<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::transport)?;
        let status = response.status();
        if status.is_server_error() {
            exn::bail!(ErrorKind::Network(Self::describe(response).await));
        }
        if !status.is_success() {
            exn::bail!(ErrorKind::InvalidResponse);
        }
        response.json::<T>().await.or_raise(|| ErrorKind::InvalidResponse)
    }

    fn now_rfc3339() -> Result<String> {
        OffsetDateTime::now_utc().format(&Rfc3339).or_raise(|| ErrorKind::InvalidResponse)
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn fetch_library(&self, user_id: &str) -> Result<Vec<LibraryRecord>> {
        let mut url = self.table("user_library");
        url.query_pairs_mut()
            .append_pair("select", LIBRARY_SELECT)
            .append_pair("user_id", &format!("eq.{user_id}"));
        let rows: Vec<LibraryRow> = self.rows(url).await?;
        let fetched_at = OffsetDateTime::now_utc();
        Ok(rows.into_iter().map(|row| row.into_record(user_id, fetched_at)).collect())
    }

    async fn fetch_books(&self, kind: BookKind) -> Result<Vec<BookMetadata>> {
        let mut url = self.table("books");
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("book_type", &format!("eq.{}", kind.as_str()))
            .append_pair("is_active", "eq.true")
            .append_pair("order", "created_at.desc");
        self.rows(url).await
    }

    async fn check_access(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let mut url = self.table("user_book_access");
        url.query_pairs_mut()
            .append_pair("select", "book_id")
            .append_pair("user_id", &format!("eq.{user_id}"))
            .append_pair("book_id", &format!("eq.{book_id}"));
        let rows: Vec<AccessRow> = self.rows(url).await?;
        Ok(!rows.is_empty())
    }

    async fn grant_access(&self, user_id: &str, book_id: &str, access: BookKind) -> Result<Applied> {
        let response = self
            .client
            .post(self.table("user_book_access"))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .json(&json!({
                "user_id": user_id,
                "book_id": book_id,
                "access_type": access.as_str(),
            }))
            .send()
            .await
            .map_err(Self::transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(Applied::Accepted);
        }
        // Unique-constraint conflict: the user already holds access, which
        // the storefront treats as success.
        if status == reqwest::StatusCode::CONFLICT {
            debug!(user_id, book_id, "grant skipped: already has access");
            return Ok(Applied::Accepted);
        }
        if status.is_client_error() {
            return Ok(Applied::Rejected(Self::describe(response).await));
        }
        exn::bail!(ErrorKind::Network(Self::describe(response).await))
    }

    async fn redeem_code(&self, user_id: &str, book_id: &str, code: &str) -> Result<Redemption> {
        let response = self
            .client
            .post(self.rpc("redeem_book_code"))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "p_user_id": user_id,
                "p_book_id": book_id,
                "p_code": code.to_uppercase(),
            }))
            .send()
            .await
            .map_err(Self::transport)?;
        let status = response.status();
        if status.is_success() {
            let row: RedemptionRow = response.json().await.or_raise(|| ErrorKind::InvalidResponse)?;
            return Ok(Redemption::from(row));
        }
        if status.is_client_error() {
            return Ok(Redemption {
                success: false,
                message: Self::describe(response).await,
            });
        }
        exn::bail!(ErrorKind::Network(Self::describe(response).await))
    }

    async fn mark_downloaded(&self, user_id: &str, book_id: &str) -> Result<Applied> {
        let mut url = self.table("user_library");
        url.query_pairs_mut()
            .append_pair("user_id", &format!("eq.{user_id}"))
            .append_pair("book_id", &format!("eq.{book_id}"));
        let response = self
            .client
            .patch(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            // Representation tells us whether any row actually matched.
            .header("Prefer", "return=representation")
            .json(&json!({
                "downloaded": true,
                "downloaded_at": Self::now_rfc3339()?,
                "sync_status": "synced",
            }))
            .send()
            .await
            .map_err(Self::transport)?;
        let status = response.status();
        if status.is_success() {
            let rows: Vec<serde_json::Value> = response.json().await.or_raise(|| ErrorKind::InvalidResponse)?;
            return Ok(if rows.is_empty() {
                Applied::Rejected("no matching library entry".to_string())
            } else {
                Applied::Accepted
            });
        }
        if status.is_client_error() {
            return Ok(Applied::Rejected(Self::describe(response).await));
        }
        exn::bail!(ErrorKind::Network(Self::describe(response).await))
    }
}
