//! OAuth 2.0 + PKCE building blocks
//!
//! This module provides the client-side OAuth 2.0 implementation used for
//! IRC network authentication:
//!
//! - **PKCE Flow**: RFC 7636 verifier/challenge generation
//! - **CSRF State**: single-use random state parameters
//! - **Token Exchange**: authorization-code and refresh-token grants
//! - **SASL OAUTHBEARER**: RFC 7628 credential encoding for the IRC
//!   connection
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   OAuthFlowManager   │  (ember-infra) session orchestration
//! └──────────┬───────────┘
//!            │
//!            ├──► OAuthHttpClient   (token endpoint POSTs)
//!            ├──► pkce utilities    (verifier/challenge/state)
//!            ├──► sasl utilities    (OAUTHBEARER wire encoding)
//!            └──► KeychainTrait     (token persistence contract)
//! ```
//!
//! # Security
//!
//! - Verifiers and tokens zeroize their backing memory on drop
//! - Verifiers are never logged and carry a redacted `Debug`
//! - State parameters are single-use and validated on every redirect

pub mod client;
pub mod pkce;
pub mod sasl;
pub mod traits;
pub mod types;

pub use client::{build_authorization_url, OAuthClientError, OAuthHttpClient};
pub use pkce::{
    generate_code_challenge, generate_code_verifier, generate_state, validate_state, CryptoError,
    CsrfState, PkceChallenge, PkceVerifier,
};
pub use sasl::encode_sasl_oauthbearer;
pub use traits::{BrowserTrait, KeychainTrait, TokenEndpoint};
pub use types::{OAuthProviderConfig, OAuthToken, ProviderErrorBody, TokenResponse};
