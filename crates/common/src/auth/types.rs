//! OAuth 2.0 types and structures
//!
//! Unified data structures for provider configuration, tokens, and the
//! token-endpoint wire formats. Token secrets zeroize their backing memory
//! on drop.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use ember_domain::constants::TOKEN_EXPIRY_MARGIN_SECS;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Configuration for an OAuth 2.0 provider attached to an IRC network.
///
/// Immutable once a session starts. `client_secret` is optional: public
/// clients rely on PKCE alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    /// Authorization endpoint the browser is sent to.
    pub authorization_url: String,

    /// Token endpoint codes and refresh tokens are exchanged at.
    pub token_url: String,

    /// OAuth client ID registered with the provider.
    pub client_id: String,

    /// Optional client secret (confidential clients only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// OAuth scopes to request.
    pub scopes: Vec<String>,
}

impl OAuthProviderConfig {
    /// Create a new provider configuration.
    #[must_use]
    pub fn new(
        authorization_url: impl Into<String>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            authorization_url: authorization_url.into(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            scopes,
        }
    }

    /// Attach a client secret for confidential clients.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Twitch OAuth configuration with the scopes IRC chat needs.
    #[must_use]
    pub fn twitch(client_id: impl Into<String>) -> Self {
        Self::new(
            "https://id.twitch.tv/oauth2/authorize",
            "https://id.twitch.tv/oauth2/token",
            client_id,
            vec!["chat:read".to_string(), "chat:edit".to_string()],
        )
    }

    /// Get scopes as a space-separated string.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Check the configuration is complete enough to start a flow.
    ///
    /// # Errors
    /// Returns the name of the first missing field. A missing authorization
    /// URL, token URL, or client ID is a caller error, not a network error.
    pub fn validate(&self) -> Result<(), String> {
        if self.authorization_url.trim().is_empty() {
            return Err("authorization_url is not configured".to_string());
        }
        if self.token_url.trim().is_empty() {
            return Err("token_url is not configured".to_string());
        }
        if self.client_id.trim().is_empty() {
            return Err("client_id is not configured".to_string());
        }
        Ok(())
    }
}

/// OAuth 2.0 access and refresh tokens with metadata.
///
/// Secret fields (`access_token`, `refresh_token`) are overwritten with
/// zero bytes before the backing memory is released.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct OAuthToken {
    /// Bearer access token for the IRC connection.
    pub access_token: String,

    /// Refresh token, when the provider issues one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type (always "Bearer" for OAuth 2.0).
    #[zeroize(skip)]
    pub token_type: String,

    /// Absolute expiration timestamp; `None` means never-expiring.
    #[zeroize(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted scopes (space-separated), when reported.
    #[zeroize(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthToken {
    /// Create a token, computing `expires_at` from a lifetime in seconds.
    ///
    /// A zero or negative `expires_in` means the provider reported no
    /// expiry; the token is treated as never-expiring.
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<i64>,
        scope: Option<String>,
    ) -> Self {
        let expires_at = expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + Duration::seconds(secs));

        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_at,
            scope,
        }
    }

    /// A token is valid when it carries a non-empty access token. Validity
    /// does not imply the token is unexpired.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Check whether the access token is expired, with a 30-second safety
    /// margin. Tokens without an expiry never expire.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) >= expires_at,
            None => false,
        }
    }

    /// Seconds until expiry, or `None` when no expiry is set.
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|at| (at - Utc::now()).num_seconds())
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// OAuth token response from the authorization server (RFC 6749).
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

impl From<TokenResponse> for OAuthToken {
    fn from(response: TokenResponse) -> Self {
        let mut token = Self::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            response.scope,
        );
        if let Some(token_type) = response.token_type {
            token.token_type = token_type;
        }
        token
    }
}

/// OAuth error response from the authorization server (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
pub struct ProviderErrorBody {
    pub error: String,
    pub error_description: Option<String>,
}

impl fmt::Display for ProviderErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::types.
    use super::*;

    #[test]
    fn token_expiry_honors_safety_margin() {
        // Expired 29 seconds ago: well inside the 30s margin.
        let mut token = OAuthToken::new("access".to_string(), None, Some(3600), None);
        token.expires_at = Some(Utc::now() - Duration::seconds(29));
        assert!(token.is_expired());

        // Expires 31 seconds from now: just outside the margin.
        token.expires_at = Some(Utc::now() + Duration::seconds(31));
        assert!(!token.is_expired());
    }

    #[test]
    fn token_without_expiry_never_expires() {
        let token = OAuthToken::new("access".to_string(), None, Some(0), None);
        assert!(token.expires_at.is_none());
        assert!(!token.is_expired());
        assert!(token.seconds_until_expiry().is_none());
    }

    #[test]
    fn token_validity_tracks_access_token() {
        let token = OAuthToken::new("access".to_string(), None, None, None);
        assert!(token.is_valid());

        let empty = OAuthToken::new(String::new(), None, None, None);
        assert!(!empty.is_valid());
    }

    #[test]
    fn token_debug_redacts_secrets() {
        let token = OAuthToken::new(
            "super-secret".to_string(),
            Some("also-secret".to_string()),
            Some(3600),
            None,
        );
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("also-secret"));
    }

    #[test]
    fn token_response_conversion() {
        let response = TokenResponse {
            access_token: "access123".to_string(),
            refresh_token: Some("refresh456".to_string()),
            token_type: Some("bearer".to_string()),
            expires_in: Some(3600),
            scope: Some("chat:read".to_string()),
        };

        let token: OAuthToken = response.into();
        assert_eq!(token.access_token, "access123");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh456"));
        assert_eq!(token.token_type, "bearer");
        assert!(token.expires_at.is_some());
        assert_eq!(token.scope.as_deref(), Some("chat:read"));
    }

    #[test]
    fn provider_config_validation() {
        let config = OAuthProviderConfig::new(
            "https://id.example.com/authorize",
            "https://id.example.com/token",
            "client123",
            vec!["chat:read".to_string()],
        );
        assert!(config.validate().is_ok());
        assert_eq!(config.scope_string(), "chat:read");

        let mut missing = config.clone();
        missing.client_id = String::new();
        assert!(missing.validate().is_err());

        let mut missing = config;
        missing.authorization_url = "  ".to_string();
        assert!(missing.validate().is_err());
    }

    #[test]
    fn twitch_preset_is_complete() {
        let config = OAuthProviderConfig::twitch("abc123");
        assert!(config.validate().is_ok());
        assert!(config.client_secret.is_none());
        assert!(config.scope_string().contains("chat:read"));
    }

    #[test]
    fn provider_error_display() {
        let err = ProviderErrorBody {
            error: "access_denied".to_string(),
            error_description: Some("user said no".to_string()),
        };
        assert_eq!(err.to_string(), "access_denied: user said no");

        let bare = ProviderErrorBody { error: "invalid_request".to_string(), error_description: None };
        assert_eq!(bare.to_string(), "invalid_request");
    }
}
