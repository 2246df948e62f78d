//! OAuth session orchestration.
//!
//! [`OAuthFlowManager`] drives Authorization-Code-with-PKCE sessions end to
//! end: it generates the PKCE material and CSRF state, starts a
//! [`LocalServer`] as the redirect target, opens the user's browser, and
//! exchanges the returned code for tokens. Every session ends in exactly one
//! invocation of its completion callback.
//!
//! Cross-context effects travel as [`SessionEvent`]s over an mpsc channel
//! into a single event-loop task; the HTTP redirect handler only inspects
//! the registry and queues an event, never blocks. Removing a session from
//! the registry is the exactly-once gate: whichever event removes it first
//! wins, and everything arriving later finds nothing to act on.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::http::StatusCode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ember_common::auth::{
    build_authorization_url, generate_code_challenge, generate_code_verifier, generate_state,
    BrowserTrait, OAuthClientError, OAuthProviderConfig, OAuthToken, PkceVerifier, TokenEndpoint,
};
use ember_domain::constants::{
    CALLBACK_BIND_ATTEMPTS, CALLBACK_PORT_RANGE, OAUTH_CALLBACK_PATH, OAUTH_FLOW_TIMEOUT_SECS,
};
use ember_domain::NetworkId;

use crate::errors::OAuthFlowError;
use crate::server::{HttpCallback, HttpReply, LocalServer, ServerCallbacks};

const WS_PROTOCOL: &str = "ember";

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Authorization Successful</h1><p>You can close this tab.</p></body>
</html>"#;

const FAILURE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>Invalid or unexpected callback parameters.</p></body>
</html>"#;

/// Callback invoked exactly once when a session finishes.
///
/// Receives the network the session belonged to, the token on success, and
/// an error message on failure. Exactly one of the two options is `Some`.
pub type CompletionCallback =
    Box<dyn FnOnce(NetworkId, Option<OAuthToken>, Option<String>) + Send + 'static>;

/// Tunable parameters for authorization flows.
#[derive(Debug, Clone)]
pub struct FlowOptions {
    /// How long a session may wait for the provider redirect.
    pub timeout: Duration,
    /// Port range the callback server binds within.
    pub port_range: RangeInclusive<u16>,
    /// Number of random ports tried before giving up.
    pub bind_attempts: u32,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(OAUTH_FLOW_TIMEOUT_SECS),
            port_range: CALLBACK_PORT_RANGE,
            bind_attempts: CALLBACK_BIND_ATTEMPTS,
        }
    }
}

/// Lifecycle state of an OAuth session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthState {
    /// Created but not yet started.
    Idle,
    /// Browser opened, waiting for the provider redirect.
    WaitingForCode,
    /// Authorization code received, token exchange in flight.
    ExchangingToken,
    /// Refresh grant in flight (no server, no browser, no timeout).
    Refreshing,
    /// Finished with a token.
    Complete,
    /// Finished with an error.
    Error,
}

/// Typed payloads crossing from handlers and timers into the event loop.
enum SessionEvent {
    CodeReceived { state: String, code: String },
    Failed { state: String, message: String },
    TimedOut { state: String },
    Cancelled { state: String },
    RefreshFinished { key: String, token: Option<OAuthToken>, error: Option<String> },
    Shutdown,
}

struct OAuthSession {
    network: NetworkId,
    provider: OAuthProviderConfig,
    verifier: Option<PkceVerifier>,
    redirect_uri: String,
    state: OAuthState,
    server: Option<LocalServer>,
    completion: Option<CompletionCallback>,
    timeout: Option<JoinHandle<()>>,
}

/// Live sessions keyed by their CSRF state parameter.
///
/// Critical sections are lookups and removals only; token exchange and
/// server shutdown happen after the session has left the map.
#[derive(Clone, Default)]
struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, OAuthSession>>>,
}

impl SessionRegistry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, OAuthSession>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, key: String, session: OAuthSession) {
        self.lock().insert(key, session);
    }

    fn remove(&self, key: &str) -> Option<OAuthSession> {
        self.lock().remove(key)
    }

    fn remove_if(
        &self,
        key: &str,
        predicate: impl FnOnce(&OAuthSession) -> bool,
    ) -> Option<OAuthSession> {
        let mut sessions = self.lock();
        if sessions.get(key).is_some_and(predicate) {
            sessions.remove(key)
        } else {
            None
        }
    }

    fn update<R>(&self, key: &str, f: impl FnOnce(&mut OAuthSession) -> R) -> Option<R> {
        self.lock().get_mut(key).map(f)
    }

    fn drain(&self) -> Vec<OAuthSession> {
        self.lock().drain().map(|(_, session)| session).collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Handle to an in-flight authorization session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    csrf_state: String,
    port: u16,
    redirect_uri: String,
    authorization_url: String,
}

impl SessionHandle {
    /// CSRF state parameter identifying the session.
    #[must_use]
    pub fn csrf_state(&self) -> &str {
        &self.csrf_state
    }

    /// Port the callback server is listening on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI supplied to the provider.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Authorization URL opened in the user's browser.
    #[must_use]
    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }
}

/// Top-level OAuth flow orchestrator.
///
/// Owns the session registry and a single event-loop task; collaborators
/// (token endpoint, browser) are injected so flows can run against mocks.
pub struct OAuthFlowManager {
    client: Arc<dyn TokenEndpoint>,
    browser: Arc<dyn BrowserTrait>,
    options: FlowOptions,
    registry: SessionRegistry,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    loop_handle: Option<JoinHandle<()>>,
}

impl OAuthFlowManager {
    /// Create a manager and spawn its event loop.
    #[must_use]
    pub fn new(
        client: Arc<dyn TokenEndpoint>,
        browser: Arc<dyn BrowserTrait>,
        options: FlowOptions,
    ) -> Self {
        let registry = SessionRegistry::default();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let loop_handle =
            tokio::spawn(run_event_loop(registry.clone(), client.clone(), events_rx));

        Self { client, browser, options, registry, events_tx, loop_handle: Some(loop_handle) }
    }

    /// Number of live sessions (authorization and refresh).
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Start an authorization flow for a network.
    ///
    /// Generates PKCE material and CSRF state, starts the callback server on
    /// a random ephemeral port, registers the session, arms the timeout, and
    /// opens the browser at the authorization URL. On success the session is
    /// `WaitingForCode` and its outcome will arrive through `completion`.
    ///
    /// # Errors
    /// Failures before the session is registered (bad config, CSPRNG
    /// unavailable, no bindable port, unparseable authorization URL) are
    /// returned directly and `completion` is never invoked; any
    /// already-started server is torn down first.
    pub async fn begin_authorization(
        &self,
        network: NetworkId,
        provider: OAuthProviderConfig,
        completion: CompletionCallback,
    ) -> Result<SessionHandle, OAuthFlowError> {
        if self.events_tx.is_closed() {
            return Err(OAuthFlowError::ManagerShutDown);
        }
        provider.validate().map_err(OAuthFlowError::Config)?;

        let verifier = generate_code_verifier()?;
        let challenge = generate_code_challenge(&verifier)?;
        let csrf = generate_state()?;

        let callbacks = ServerCallbacks {
            on_http: Some(redirect_callback(self.registry.clone(), self.events_tx.clone())),
            on_message: None,
        };
        let mut server = self.start_callback_server(callbacks).await?;
        let port = server.port();
        let redirect_uri = format!("http://localhost:{port}{OAUTH_CALLBACK_PATH}");

        let authorization_url =
            match build_authorization_url(&provider, &redirect_uri, &csrf, &challenge) {
                Ok(url) => url.to_string(),
                Err(err) => {
                    if let Err(stop_err) = server.shutdown().await {
                        warn!(error = %stop_err, "callback server did not stop cleanly");
                    }
                    return Err(err.into());
                }
            };

        let key = csrf.as_str().to_string();
        let timer = {
            let events = self.events_tx.clone();
            let state = key.clone();
            let timeout = self.options.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = events.send(SessionEvent::TimedOut { state });
            })
        };

        let session = OAuthSession {
            network: network.clone(),
            provider,
            verifier: Some(verifier),
            redirect_uri: redirect_uri.clone(),
            state: OAuthState::WaitingForCode,
            server: Some(server),
            completion: Some(completion),
            timeout: Some(timer),
        };
        self.registry.insert(key.clone(), session);

        info!(network = %network, port, "authorization flow started");
        self.browser.open_url(&authorization_url);

        Ok(SessionHandle { csrf_state: key, port, redirect_uri, authorization_url })
    }

    /// Cancel a session.
    ///
    /// A live session finishes with "OAuth flow cancelled"; an
    /// already-finished session is unaffected.
    pub fn cancel(&self, handle: &SessionHandle) {
        let _ = self
            .events_tx
            .send(SessionEvent::Cancelled { state: handle.csrf_state.clone() });
    }

    /// Start a refresh-token flow for a network.
    ///
    /// Mirrors the exchange through the session machinery (completion fires
    /// exactly once, subsystem shutdown cancels it) but involves no server,
    /// no browser, and no timeout timer.
    ///
    /// # Errors
    /// Returns [`OAuthFlowError::Config`] when the provider configuration is
    /// incomplete; `completion` is never invoked in that case.
    pub fn refresh_token(
        &self,
        network: NetworkId,
        provider: OAuthProviderConfig,
        refresh_token: &str,
        completion: CompletionCallback,
    ) -> Result<(), OAuthFlowError> {
        if self.events_tx.is_closed() {
            return Err(OAuthFlowError::ManagerShutDown);
        }
        provider.validate().map_err(OAuthFlowError::Config)?;

        let key = format!("refresh-{}", Uuid::new_v4());
        let session = OAuthSession {
            network,
            provider: provider.clone(),
            verifier: None,
            redirect_uri: String::new(),
            state: OAuthState::Refreshing,
            server: None,
            completion: Some(completion),
            timeout: None,
        };
        self.registry.insert(key.clone(), session);

        let client = self.client.clone();
        let events = self.events_tx.clone();
        let refresh_token = refresh_token.to_string();
        tokio::spawn(async move {
            let event = match client.refresh_token(&provider, &refresh_token).await {
                Ok(token) => {
                    SessionEvent::RefreshFinished { key, token: Some(token), error: None }
                }
                Err(err) => SessionEvent::RefreshFinished {
                    key,
                    token: None,
                    error: Some(err.to_string()),
                },
            };
            let _ = events.send(event);
        });

        Ok(())
    }

    /// Shut down the subsystem: cancel every live session (each fires its
    /// completion with "OAuth flow cancelled"), then stop the event loop.
    ///
    /// Idempotent; a second call returns immediately.
    pub async fn shutdown(&mut self) {
        let _ = self.events_tx.send(SessionEvent::Shutdown);
        if let Some(handle) = self.loop_handle.take() {
            if handle.await.is_err() {
                warn!("event loop task failed during shutdown");
            }
        }
    }

    async fn start_callback_server(
        &self,
        callbacks: ServerCallbacks,
    ) -> Result<LocalServer, OAuthFlowError> {
        let attempts = self.options.bind_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let port = random_port(&self.options.port_range);
            match LocalServer::start(port, WS_PROTOCOL, callbacks.clone()).await {
                Ok(server) => return Ok(server),
                Err(source) if attempt >= attempts => {
                    return Err(OAuthFlowError::Bind { attempts, source });
                }
                Err(err) => debug!(port, error = %err, "port unavailable, retrying"),
            }
        }
    }
}

fn random_port(range: &RangeInclusive<u16>) -> u16 {
    use rand::Rng;
    rand::thread_rng().gen_range(range.clone())
}

enum RedirectOutcome {
    Code(String),
    Fail(String),
}

fn redirect_callback(
    registry: SessionRegistry,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> HttpCallback {
    Arc::new(move |path, params| {
        if path != OAUTH_CALLBACK_PATH {
            return None;
        }
        Some(handle_redirect(&registry, &events, params))
    })
}

/// Classify a provider redirect and queue the resulting event.
///
/// Unknown or absent `state` mutates nothing and answers 400. An accepted
/// redirect transitions the session under the registry lock so later
/// redirects for the same session are rejected, then hands the outcome to
/// the event loop.
fn handle_redirect(
    registry: &SessionRegistry,
    events: &mpsc::UnboundedSender<SessionEvent>,
    params: &HashMap<String, String>,
) -> HttpReply {
    let Some(state_param) = params.get("state") else {
        return HttpReply::html(StatusCode::BAD_REQUEST, FAILURE_PAGE);
    };

    let outcome = registry
        .update(state_param, |session| {
            if session.state != OAuthState::WaitingForCode {
                return None;
            }
            if let Some(error) = params.get("error") {
                session.state = OAuthState::Error;
                let message = match params.get("error_description") {
                    Some(desc) => format!("OAuth error: {error}: {desc}"),
                    None => format!("OAuth error: {error}"),
                };
                return Some(RedirectOutcome::Fail(message));
            }
            match params.get("code") {
                Some(code) => {
                    session.state = OAuthState::ExchangingToken;
                    Some(RedirectOutcome::Code(code.clone()))
                }
                None => {
                    session.state = OAuthState::Error;
                    Some(RedirectOutcome::Fail(
                        "No authorization code received".to_string(),
                    ))
                }
            }
        })
        .flatten();

    match outcome {
        Some(RedirectOutcome::Code(code)) => {
            let _ = events.send(SessionEvent::CodeReceived { state: state_param.clone(), code });
            HttpReply::html(StatusCode::OK, SUCCESS_PAGE)
        }
        Some(RedirectOutcome::Fail(message)) => {
            let _ = events.send(SessionEvent::Failed { state: state_param.clone(), message });
            HttpReply::html(StatusCode::BAD_REQUEST, FAILURE_PAGE)
        }
        None => {
            debug!("redirect with unknown or stale state rejected");
            HttpReply::html(StatusCode::BAD_REQUEST, FAILURE_PAGE)
        }
    }
}

async fn run_event_loop(
    registry: SessionRegistry,
    client: Arc<dyn TokenEndpoint>,
    mut events_rx: mpsc::UnboundedReceiver<SessionEvent>,
) {
    while let Some(event) = events_rx.recv().await {
        match event {
            SessionEvent::CodeReceived { state, code } => {
                if let Some(session) = registry.remove(&state) {
                    exchange_and_finish(client.as_ref(), session, &code).await;
                }
            }
            SessionEvent::Failed { state, message } => {
                if let Some(session) = registry.remove(&state) {
                    finish_session(session, None, Some(message)).await;
                }
            }
            SessionEvent::TimedOut { state } => {
                let timed_out =
                    registry.remove_if(&state, |s| s.state == OAuthState::WaitingForCode);
                if let Some(session) = timed_out {
                    finish_session(session, None, Some("OAuth flow timed out".to_string())).await;
                }
            }
            SessionEvent::Cancelled { state } => {
                if let Some(session) = registry.remove(&state) {
                    finish_session(session, None, Some("OAuth flow cancelled".to_string())).await;
                }
            }
            SessionEvent::RefreshFinished { key, token, error } => {
                if let Some(session) = registry.remove(&key) {
                    finish_session(session, token, error).await;
                }
            }
            SessionEvent::Shutdown => {
                for session in registry.drain() {
                    finish_session(session, None, Some("OAuth flow cancelled".to_string())).await;
                }
                break;
            }
        }
    }
}

async fn exchange_and_finish(client: &dyn TokenEndpoint, mut session: OAuthSession, code: &str) {
    let result = match session.verifier.take() {
        Some(verifier) => {
            client
                .exchange_code(&session.provider, &session.redirect_uri, code, &verifier)
                .await
        }
        None => Err(OAuthClientError::Config("session has no PKCE verifier".to_string())),
    };

    match result {
        Ok(token) => finish_session(session, Some(token), None).await,
        Err(err) => finish_session(session, None, Some(err.to_string())).await,
    }
}

/// Single exit point for every session.
///
/// Stops the timeout timer and the callback server, waits for the server
/// task to finish, and only then invokes the completion callback. Dropping
/// the session afterwards zeroizes its secret material.
async fn finish_session(
    mut session: OAuthSession,
    token: Option<OAuthToken>,
    error: Option<String>,
) {
    if let Some(timer) = session.timeout.take() {
        timer.abort();
    }
    if let Some(mut server) = session.server.take() {
        if let Err(err) = server.shutdown().await {
            warn!(error = %err, "callback server did not stop cleanly");
        }
    }

    info!(network = %session.network, ok = token.is_some(), "oauth session finished");
    if let Some(completion) = session.completion.take() {
        completion(session.network.clone(), token, error);
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for redirect classification; full flows are covered by the
    //! crate's integration tests.
    use super::*;

    fn test_provider() -> OAuthProviderConfig {
        OAuthProviderConfig::new(
            "https://id.example.com/authorize",
            "https://id.example.com/token",
            "client",
            vec!["chat:read".to_string()],
        )
    }

    fn waiting_session() -> OAuthSession {
        OAuthSession {
            network: NetworkId::new("libera"),
            provider: test_provider(),
            verifier: None,
            redirect_uri: "http://localhost:49200/oauth/callback".to_string(),
            state: OAuthState::WaitingForCode,
            server: None,
            completion: None,
            timeout: None,
        }
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn unknown_state_rejected_without_mutation() {
        let registry = SessionRegistry::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.insert("known".to_string(), waiting_session());

        let reply = handle_redirect(&registry, &tx, &params(&[("state", "other"), ("code", "c")]));

        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
        let state = registry.update("known", |s| s.state);
        assert_eq!(state, Some(OAuthState::WaitingForCode));
    }

    #[test]
    fn missing_state_rejected() {
        let registry = SessionRegistry::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let reply = handle_redirect(&registry, &tx, &params(&[("code", "c")]));

        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn provider_error_queues_failure() {
        let registry = SessionRegistry::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.insert("s1".to_string(), waiting_session());

        let reply = handle_redirect(
            &registry,
            &tx,
            &params(&[("state", "s1"), ("error", "access_denied")]),
        );

        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        match rx.try_recv() {
            Ok(SessionEvent::Failed { state, message }) => {
                assert_eq!(state, "s1");
                assert_eq!(message, "OAuth error: access_denied");
            }
            _ => panic!("expected a Failed event"),
        }
        assert_eq!(registry.update("s1", |s| s.state), Some(OAuthState::Error));
    }

    #[test]
    fn error_description_is_appended() {
        let registry = SessionRegistry::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.insert("s1".to_string(), waiting_session());

        handle_redirect(
            &registry,
            &tx,
            &params(&[
                ("state", "s1"),
                ("error", "access_denied"),
                ("error_description", "user declined"),
            ]),
        );

        match rx.try_recv() {
            Ok(SessionEvent::Failed { message, .. }) => {
                assert_eq!(message, "OAuth error: access_denied: user declined");
            }
            _ => panic!("expected a Failed event"),
        }
    }

    #[test]
    fn missing_code_queues_failure() {
        let registry = SessionRegistry::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.insert("s1".to_string(), waiting_session());

        let reply = handle_redirect(&registry, &tx, &params(&[("state", "s1")]));

        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        match rx.try_recv() {
            Ok(SessionEvent::Failed { message, .. }) => {
                assert_eq!(message, "No authorization code received");
            }
            _ => panic!("expected a Failed event"),
        }
    }

    #[test]
    fn successful_redirect_transitions_and_queues_code() {
        let registry = SessionRegistry::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.insert("s1".to_string(), waiting_session());

        let reply = handle_redirect(&registry, &tx, &params(&[("state", "s1"), ("code", "abc")]));

        assert_eq!(reply.status, StatusCode::OK);
        match rx.try_recv() {
            Ok(SessionEvent::CodeReceived { state, code }) => {
                assert_eq!(state, "s1");
                assert_eq!(code, "abc");
            }
            _ => panic!("expected a CodeReceived event"),
        }
        assert_eq!(registry.update("s1", |s| s.state), Some(OAuthState::ExchangingToken));
    }

    #[test]
    fn second_redirect_for_same_session_rejected() {
        let registry = SessionRegistry::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.insert("s1".to_string(), waiting_session());

        handle_redirect(&registry, &tx, &params(&[("state", "s1"), ("code", "abc")]));
        let _ = rx.try_recv();

        let reply = handle_redirect(&registry, &tx, &params(&[("state", "s1"), ("code", "def")]));
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
    }
}
