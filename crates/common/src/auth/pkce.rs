//! PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
//!
//! Implements RFC 7636 for secure OAuth authorization without client
//! secrets, plus the CSRF state parameter the redirect handler correlates
//! sessions with.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The unreserved URI character set (RFC 3986 §2.3), the alphabet RFC 7636
/// permits for code verifiers.
const VERIFIER_ALPHABET: &[u8; 66] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Verifier length in characters. Fixed, within RFC 7636's 43-128 bound.
const VERIFIER_LEN: usize = 43;

/// Bytes of entropy behind a CSRF state parameter.
const STATE_BYTES: usize = 16;

/// Error type for CSPRNG-backed generation.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The operating system's random source was unavailable.
    #[error("random generator unavailable: {0}")]
    RngUnavailable(#[from] rand::Error),
}

/// A PKCE code verifier.
///
/// Kept secret until token exchange; zeroizes its backing memory on drop
/// and never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// The verifier string, for the token-exchange request body.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PkceVerifier(<redacted>)")
    }
}

/// A PKCE code challenge: `base64url(SHA-256(verifier))`, unpadded.
///
/// Sent in the authorization request; not secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// The challenge string, for the `code_challenge` query parameter.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PkceChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single-use CSRF state parameter: 16 random bytes, lowercase hex.
///
/// Embedded in the authorization request and echoed back in the redirect;
/// the redirect handler uses it to look up the originating session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CsrfState(String);

impl CsrfState {
    /// Wrap a raw state string received in a redirect for session lookup.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The state string, for the `state` query parameter.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CsrfState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a cryptographically secure code verifier.
///
/// Draws random bytes from the OS CSPRNG and maps each into the unreserved
/// character set, producing a fixed 43-character verifier.
///
/// The `byte % 66` mapping is slightly non-uniform (66 is not a power of
/// two) and is kept as-is for compatibility with the established wire
/// behavior; the entropy loss is negligible.
///
/// # Errors
/// Fails only if the OS random source is unavailable.
pub fn generate_code_verifier() -> Result<PkceVerifier, CryptoError> {
    let mut bytes = [0u8; VERIFIER_LEN];
    OsRng.try_fill_bytes(&mut bytes)?;

    let verifier: String = bytes
        .iter()
        .map(|b| char::from(VERIFIER_ALPHABET[usize::from(*b) % VERIFIER_ALPHABET.len()]))
        .collect();

    bytes.zeroize();
    Ok(PkceVerifier(verifier))
}

/// Generate the code challenge for a verifier using SHA-256.
///
/// Per RFC 7636 the challenge is `BASE64URL(SHA256(ASCII(code_verifier)))`
/// with padding stripped. Deterministic given the verifier.
pub fn generate_code_challenge(verifier: &PkceVerifier) -> Result<PkceChallenge, CryptoError> {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_str().as_bytes());
    let hash = hasher.finalize();
    Ok(PkceChallenge(URL_SAFE_NO_PAD.encode(hash)))
}

/// Generate a random state token for CSRF protection.
///
/// 16 random bytes, lowercase hex encoded (32 characters), single-use.
///
/// # Errors
/// Fails only if the OS random source is unavailable.
pub fn generate_state() -> Result<CsrfState, CryptoError> {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(CsrfState(hex::encode(bytes)))
}

/// Validate that a received state token matches the expected one.
#[must_use]
pub fn validate_state(expected: &CsrfState, actual: &str) -> bool {
    expected.as_str() == actual
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::pkce.
    use super::*;

    #[test]
    fn verifier_is_43_unreserved_chars() {
        let verifier = generate_code_verifier().expect("verifier generation failed");
        assert_eq!(verifier.as_str().len(), 43);
        assert!(verifier
            .as_str()
            .bytes()
            .all(|b| VERIFIER_ALPHABET.contains(&b)));
    }

    #[test]
    fn verifiers_are_unique() {
        let a = generate_code_verifier().expect("verifier a");
        let b = generate_code_verifier().expect("verifier b");
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn verifier_debug_is_redacted() {
        let verifier = generate_code_verifier().expect("verifier");
        let debug = format!("{verifier:?}");
        assert!(!debug.contains(verifier.as_str()));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn challenge_is_deterministic_and_base64url() {
        let verifier = generate_code_verifier().expect("verifier");
        let c1 = generate_code_challenge(&verifier).expect("challenge 1");
        let c2 = generate_code_challenge(&verifier).expect("challenge 2");

        assert_eq!(c1, c2);
        assert!(!c1.as_str().contains('+'));
        assert!(!c1.as_str().contains('/'));
        assert!(!c1.as_str().contains('='));
        // SHA-256 digest is 32 bytes -> 43 base64url chars unpadded.
        assert_eq!(c1.as_str().len(), 43);
    }

    #[test]
    fn known_challenge_vector() {
        // RFC 7636 appendix B test vector.
        let verifier = PkceVerifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        let challenge = generate_code_challenge(&verifier).expect("challenge");
        assert_eq!(challenge.as_str(), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn state_is_32_lowercase_hex() {
        let state = generate_state().expect("state");
        assert_eq!(state.as_str().len(), 32);
        assert!(state
            .as_str()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn state_validation() {
        let state = generate_state().expect("state");
        assert!(validate_state(&state, state.as_str()));
        assert!(!validate_state(&state, "deadbeefdeadbeefdeadbeefdeadbeef"));
        assert!(!validate_state(&state, ""));
    }

    #[test]
    fn states_are_unique() {
        let a = generate_state().expect("state a");
        let b = generate_state().expect("state b");
        assert_ne!(a, b);
    }
}
