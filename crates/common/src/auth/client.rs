//! OAuth 2.0 token-endpoint client and authorization URL building
//!
//! Defines the request shapes for the authorization-code and refresh-token
//! grants and maps provider responses into [`OAuthToken`]s. Transport is
//! `reqwest`; transport failures are surfaced, never retried here — retry
//! policy belongs to the caller.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::pkce::{CryptoError, CsrfState, PkceChallenge, PkceVerifier};
use super::traits::TokenEndpoint;
use super::types::{OAuthProviderConfig, OAuthToken, ProviderErrorBody, TokenResponse};

/// Error type for OAuth client operations.
#[derive(Debug, Error)]
pub enum OAuthClientError {
    /// Provider configuration is incomplete (caller error).
    #[error("Configuration error: {0}")]
    Config(String),

    /// CSPRNG unavailable during PKCE generation.
    #[error("PKCE generation error: {0}")]
    Crypto(#[from] CryptoError),

    /// HTTP request failed before a response was obtained.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The authorization server returned an OAuth error body.
    #[error("OAuth error: {}", error_text(.code, .description.as_deref()))]
    Provider {
        code: String,
        description: Option<String>,
    },

    /// The response could not be parsed as a token or error body.
    #[error("Parse error: {0}")]
    Parse(String),

    /// No refresh token is available for the refresh grant.
    #[error("No refresh token available")]
    NoRefreshToken,
}

fn error_text(code: &str, description: Option<&str>) -> String {
    match description {
        Some(desc) => format!("{code}: {desc}"),
        None => code.to_string(),
    }
}

/// Build the provider authorization URL for a session.
///
/// Appends the fixed parameters `response_type=code` and
/// `code_challenge_method=S256` alongside the percent-encoded client,
/// redirect, scope, state, and challenge values.
///
/// # Errors
/// Returns [`OAuthClientError::Config`] when the provider configuration is
/// incomplete or the assembled URL does not parse.
pub fn build_authorization_url(
    provider: &OAuthProviderConfig,
    redirect_uri: &str,
    state: &CsrfState,
    challenge: &PkceChallenge,
) -> Result<Url, OAuthClientError> {
    provider.validate().map_err(OAuthClientError::Config)?;

    let params = [
        ("response_type", "code".to_string()),
        ("client_id", provider.client_id.clone()),
        ("redirect_uri", redirect_uri.to_string()),
        ("scope", provider.scope_string()),
        ("state", state.as_str().to_string()),
        ("code_challenge", challenge.as_str().to_string()),
        ("code_challenge_method", "S256".to_string()),
    ];

    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let url = format!("{}?{}", provider.authorization_url, query);
    Url::parse(&url).map_err(|err| OAuthClientError::Config(format!("invalid authorization URL: {err}")))
}

/// Token-endpoint HTTP client.
///
/// Implements RFC 6749 (authorization-code and refresh-token grants) and
/// RFC 7636 (PKCE `code_verifier` submission).
#[derive(Debug, Clone)]
pub struct OAuthHttpClient {
    http: reqwest::Client,
}

impl Default for OAuthHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthHttpClient {
    /// Create a client with a bounded request timeout.
    #[must_use]
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }

    async fn post_token_request(
        &self,
        token_url: &str,
        form: &[(&str, &str)],
    ) -> Result<OAuthToken, OAuthClientError> {
        let response = self.http.post(token_url).form(form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<ProviderErrorBody>(&body) {
                Ok(err) => Err(OAuthClientError::Provider {
                    code: err.error,
                    description: err.error_description,
                }),
                Err(_) => Err(OAuthClientError::Parse(format!(
                    "token endpoint returned {status} with unrecognized body"
                ))),
            };
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| OAuthClientError::Parse(err.to_string()))?;

        Ok(token.into())
    }
}

#[async_trait]
impl TokenEndpoint for OAuthHttpClient {
    async fn exchange_code(
        &self,
        provider: &OAuthProviderConfig,
        redirect_uri: &str,
        code: &str,
        verifier: &PkceVerifier,
    ) -> Result<OAuthToken, OAuthClientError> {
        provider.validate().map_err(OAuthClientError::Config)?;

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", provider.client_id.as_str()),
            ("code_verifier", verifier.as_str()),
        ];
        if let Some(secret) = provider.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        debug!(token_url = %provider.token_url, "exchanging authorization code");
        self.post_token_request(&provider.token_url, &form).await
    }

    async fn refresh_token(
        &self,
        provider: &OAuthProviderConfig,
        refresh_token: &str,
    ) -> Result<OAuthToken, OAuthClientError> {
        provider.validate().map_err(OAuthClientError::Config)?;
        if refresh_token.is_empty() {
            return Err(OAuthClientError::NoRefreshToken);
        }

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", provider.client_id.as_str()),
        ];
        if let Some(secret) = provider.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        debug!(token_url = %provider.token_url, "refreshing access token");
        self.post_token_request(&provider.token_url, &form).await
    }
}
