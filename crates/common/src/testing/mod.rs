//! Testing utilities and helpers
//!
//! In-memory doubles for the OAuth flow's external collaborators:
//! - [`MockKeychainProvider`]: keychain storage backed by a `HashMap`
//! - [`MockBrowser`]: records opened URLs instead of launching a browser

pub mod mocks;

pub use mocks::{MockBrowser, MockKeychainProvider};
