//! Ember infrastructure: the embedded local server and the OAuth session
//! state machine.
//!
//! `server` hosts the loopback HTTP/WebSocket server the OAuth redirect
//! lands on; `oauth` drives sessions from authorization URL to an exchanged
//! token, delivering exactly one completion per session.

#![forbid(unsafe_code)]

pub mod errors;
pub mod oauth;
pub mod server;

pub use errors::OAuthFlowError;
pub use oauth::{CompletionCallback, FlowOptions, OAuthFlowManager, OAuthState, SessionHandle};
pub use server::{ClientId, HttpReply, LocalServer, ServerCallbacks, ServerError};
