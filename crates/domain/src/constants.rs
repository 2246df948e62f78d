//! Constants bounding the OAuth flow and the embedded local server.

use std::ops::RangeInclusive;

/// Path the provider redirects to on the embedded local server.
pub const OAUTH_CALLBACK_PATH: &str = "/oauth/callback";

/// Ephemeral port range the callback server binds within (IANA dynamic
/// range).
pub const CALLBACK_PORT_RANGE: RangeInclusive<u16> = 49152..=65535;

/// Number of random ports tried before a bind failure is surfaced.
pub const CALLBACK_BIND_ATTEMPTS: u32 = 5;

/// Seconds a session may sit in `WaitingForCode` before timing out.
pub const OAUTH_FLOW_TIMEOUT_SECS: u64 = 300;

/// Safety margin subtracted from a token's expiry before comparing to now.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

/// Largest WebSocket text frame the local server accepts. Oversized frames
/// are rejected, never truncated.
pub const WS_MAX_FRAME_BYTES: usize = 64 * 1024;
