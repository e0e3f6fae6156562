//! Network interception layer for the shelf storefront.
//!
//! A long-lived worker with its own install/activate/serve lifecycle,
//! independent of any page or CLI invocation that talks to it. All
//! outbound requests funnel through the worker's channel; it answers
//! every one of them, online or not, by choosing a strategy per request
//! class:
//!
//! - backend-origin GETs are **network-first**: live data wins, the byte
//!   cache catches the fall.
//! - same-origin asset GETs are **cache-first**: the cached copy wins,
//!   the network fills misses.
//! - everything else passes through untouched.
//!
//! The byte cache is its own substrate, deliberately separate from the
//! structured store: this crate caches request/response bytes keyed by
//! URL, nothing more. Eviction is generational - bump the version tag and
//! the activate phase deletes every older generation wholesale.

pub mod cache;
pub mod error;
mod fetch;
mod types;
mod worker;

pub use crate::cache::AssetCache;
pub use crate::fetch::{Fetch, FetchHandle, HttpFetcher};
#[cfg(any(test, feature = "mock"))]
pub use crate::fetch::MockFetcher;
pub use crate::types::{Request, Response};
pub use crate::worker::{ASSET_EXTENSIONS, Gateway, GatewayConfig, GatewayHandle};
