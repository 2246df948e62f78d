//! Common utilities shared across Ember crates.
//!
//! The `auth` module carries the OAuth 2.0 + PKCE building blocks used by
//! the client: verifier/challenge/state generation, token types with
//! zeroize-on-drop secret handling, the token-endpoint HTTP client, and the
//! SASL OAUTHBEARER credential encoding handed to the IRC engine.
//!
//! The `testing` module provides in-memory doubles for the external
//! collaborators (keychain, browser) so flows can be exercised without
//! platform services.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod testing;
