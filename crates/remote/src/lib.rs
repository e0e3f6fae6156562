//! Typed boundary to the hosted backend.
//!
//! The backend is a generic row API ("select rows matching predicate,
//! ordered by column" over named tables) plus one remote procedure for
//! code redemption. This crate keeps that boundary honest: requests go
//! in, typed rows or a transport error come out, and *business* refusals
//! (invalid code, duplicate grant) come back as structured results rather
//! than errors - callers branch on a success flag, they don't catch.
//!
//! [`HttpRemote`] is the production implementation; [`MockRemote`]
//! (behind the `mock` feature) is an in-memory stand-in with a switchable
//! "offline" mode for exercising fallback paths in tests.

pub mod error;
mod http;
#[cfg(feature = "mock")]
mod mock;
mod rows;
mod source;

pub use crate::http::HttpRemote;
#[cfg(feature = "mock")]
pub use crate::mock::MockRemote;
pub use crate::source::{Applied, Redemption, RemoteHandle, RemoteSource};
