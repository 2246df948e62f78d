//! Shared domain types for the Ember IRC client.
//!
//! This crate holds the foundational pieces every other Ember crate builds
//! on: the error taxonomy, network identity types, and the constants that
//! bound the OAuth flow (port ranges, timeouts, wire limits).

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod constants;
pub mod errors;
pub mod types;

pub use errors::{EmberError, Result};
pub use types::NetworkId;
