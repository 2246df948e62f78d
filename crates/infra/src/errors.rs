//! Flow-level error type and mappings into the application error taxonomy.

use ember_common::auth::{CryptoError, OAuthClientError};
use ember_domain::EmberError;
use thiserror::Error;

use crate::server::ServerError;

/// Error type for OAuth flow orchestration.
///
/// Only failures that occur before a session exists surface through this
/// type; once a session is registered, failures travel through its
/// completion callback instead.
#[derive(Debug, Error)]
pub enum OAuthFlowError {
    /// Provider configuration is incomplete.
    #[error("Configuration error: {0}")]
    Config(String),

    /// CSPRNG unavailable during PKCE or state generation.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// No port in the ephemeral range could be bound.
    #[error("failed to bind local callback server after {attempts} attempts")]
    Bind {
        attempts: u32,
        #[source]
        source: ServerError,
    },

    /// Token endpoint interaction failed.
    #[error(transparent)]
    Client(#[from] OAuthClientError),

    /// The manager event loop has shut down.
    #[error("OAuth flow manager is shut down")]
    ManagerShutDown,
}

impl From<OAuthFlowError> for EmberError {
    fn from(err: OAuthFlowError) -> Self {
        match err {
            OAuthFlowError::Config(msg) => EmberError::Config(msg),
            OAuthFlowError::Crypto(inner) => EmberError::Security(inner.to_string()),
            bind @ OAuthFlowError::Bind { .. } => EmberError::Network(bind.to_string()),
            OAuthFlowError::Client(inner) => map_client_error(inner),
            OAuthFlowError::ManagerShutDown => {
                EmberError::Internal("OAuth flow manager is shut down".to_string())
            }
        }
    }
}

fn map_client_error(err: OAuthClientError) -> EmberError {
    match err {
        OAuthClientError::Config(msg) => EmberError::Config(msg),
        OAuthClientError::Crypto(inner) => EmberError::Security(inner.to_string()),
        OAuthClientError::Transport(inner) => EmberError::Network(inner.to_string()),
        provider @ OAuthClientError::Provider { .. } => EmberError::Auth(provider.to_string()),
        OAuthClientError::Parse(msg) => EmberError::InvalidInput(msg),
        OAuthClientError::NoRefreshToken => {
            EmberError::Auth("no refresh token available".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_errors_map_into_taxonomy() {
        let err: EmberError = OAuthFlowError::Config("missing client id".into()).into();
        assert!(matches!(err, EmberError::Config(_)));

        let err: EmberError = OAuthFlowError::Client(OAuthClientError::Provider {
            code: "invalid_grant".into(),
            description: None,
        })
        .into();
        assert!(matches!(err, EmberError::Auth(_)));

        let err: EmberError =
            OAuthFlowError::Client(OAuthClientError::Parse("bad body".into())).into();
        assert!(matches!(err, EmberError::InvalidInput(_)));
    }
}
