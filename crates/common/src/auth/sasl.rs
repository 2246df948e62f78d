//! SASL OAUTHBEARER credential encoding (RFC 7628)
//!
//! Builds the base64 payload sent in the IRC `AUTHENTICATE` exchange once
//! a bearer token has been obtained. The byte layout is a wire-format
//! contract: the GS2 header `n,,` followed by `\x01`-delimited key/value
//! pairs and a terminating `\x01`. Peers reject any deviation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const CTRL_A: char = '\u{1}';

/// Encode a bearer token as a SASL OAUTHBEARER initial client response.
///
/// Layout without host/port:
/// `n,,\x01auth=Bearer <token>\x01\x01`
///
/// Layout with host and port:
/// `n,,\x01auth=Bearer <token>\x01host=<host>\x01port=<port>\x01\x01`
///
/// The whole byte string is base64 encoded for the `AUTHENTICATE` command.
#[must_use]
pub fn encode_sasl_oauthbearer(token: &str, host: Option<&str>, port: Option<u16>) -> String {
    let mut raw = String::with_capacity(32 + token.len());
    raw.push_str("n,,");
    raw.push(CTRL_A);
    raw.push_str("auth=Bearer ");
    raw.push_str(token);
    raw.push(CTRL_A);

    if let Some(host) = host {
        raw.push_str("host=");
        raw.push_str(host);
        raw.push(CTRL_A);
    }
    if let Some(port) = port {
        raw.push_str("port=");
        raw.push_str(&port.to_string());
        raw.push(CTRL_A);
    }

    raw.push(CTRL_A);
    STANDARD.encode(raw.as_bytes())
}
