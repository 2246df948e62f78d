//! Traits for the OAuth flow's external collaborators
//!
//! These traits abstract the token endpoint, the platform credential
//! store, and the system browser so flows can be driven and tested without
//! the real services.

use async_trait::async_trait;

use super::client::OAuthClientError;
use super::pkce::PkceVerifier;
use super::types::{OAuthProviderConfig, OAuthToken};

/// Trait for token-endpoint operations.
///
/// Implemented by [`super::client::OAuthHttpClient`]; mocked in tests.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code (plus PKCE verifier) for tokens.
    ///
    /// # Errors
    /// Returns an error on transport failure, a provider error body, or an
    /// unparseable response.
    async fn exchange_code(
        &self,
        provider: &OAuthProviderConfig,
        redirect_uri: &str,
        code: &str,
        verifier: &PkceVerifier,
    ) -> Result<OAuthToken, OAuthClientError>;

    /// Obtain a fresh token set from a refresh token.
    ///
    /// # Errors
    /// Returns an error when no refresh token is supplied, on transport
    /// failure, or when the token is invalid/revoked.
    async fn refresh_token(
        &self,
        provider: &OAuthProviderConfig,
        refresh_token: &str,
    ) -> Result<OAuthToken, OAuthClientError>;
}

/// Trait for credential-store operations.
///
/// Backed by an OS credential store in the application; this crate only
/// defines the call contract.
#[async_trait]
pub trait KeychainTrait: Send + Sync {
    /// Persist tokens for a network.
    ///
    /// # Errors
    /// Returns a description of the failure when storage fails.
    async fn save_tokens(&self, network: &str, tokens: &OAuthToken) -> Result<(), String>;

    /// Load previously stored tokens for a network, if any exist.
    async fn load_tokens(&self, network: &str) -> Option<OAuthToken>;

    /// Remove stored tokens for a network (idempotent).
    ///
    /// # Errors
    /// Returns a description of the failure when deletion fails.
    async fn clear_tokens(&self, network: &str) -> Result<(), String>;

    /// Check whether tokens exist for a network.
    async fn has_tokens(&self, network: &str) -> bool;
}

/// Trait for opening a URL in the user's browser.
///
/// Fire-and-forget: the flow observes no result; the user either completes
/// the authorization or the session times out.
pub trait BrowserTrait: Send + Sync {
    /// Open the URL in the system browser.
    fn open_url(&self, url: &str);
}
