//! Embedded loopback HTTP/WebSocket server.
//!
//! [`LocalServer`] binds `127.0.0.1:<port>` and runs axum in a dedicated
//! tokio task. It carries no application semantics of its own: HTTP requests
//! are handed to an injected callback that decides the reply, and WebSocket
//! text frames are handed to an injected message callback. The OAuth flow
//! plugs its redirect handling in through the HTTP callback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use ember_domain::constants::WS_MAX_FRAME_BYTES;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Identity of a connected WebSocket client.
pub type ClientId = Uuid;

/// Reply an HTTP callback produces for a request it recognizes.
#[derive(Debug, Clone)]
pub struct HttpReply {
    /// HTTP status to answer with.
    pub status: StatusCode,
    /// Value for the `Content-Type` header.
    pub content_type: &'static str,
    /// Response body.
    pub body: String,
}

impl HttpReply {
    /// An HTML reply with the given status.
    #[must_use]
    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        Self { status, content_type: "text/html; charset=utf-8", body: body.into() }
    }
}

/// Callback deciding the reply for an HTTP request.
///
/// Receives the request path and decoded query parameters. Returning `None`
/// means the path is not recognized and the server answers 404. Must not
/// block: do the lookup, queue an event, return.
pub type HttpCallback = Arc<dyn Fn(&str, &HashMap<String, String>) -> Option<HttpReply> + Send + Sync>;

/// Callback invoked for each inbound WebSocket text frame.
pub type MessageCallback = Arc<dyn Fn(ClientId, String) + Send + Sync>;

/// Injected behavior for a [`LocalServer`].
#[derive(Clone, Default)]
pub struct ServerCallbacks {
    /// HTTP request handler; `None` answers every request with 404.
    pub on_http: Option<HttpCallback>,
    /// WebSocket text-frame handler; `None` discards inbound frames.
    pub on_message: Option<MessageCallback>,
}

/// Error type for the local server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The requested port could not be bound (recoverable: retry another
    /// port).
    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The server task panicked.
    #[error("local server task failed: {0}")]
    Task(String),
}

type ClientMap = Arc<Mutex<HashMap<ClientId, mpsc::UnboundedSender<String>>>>;

fn lock_clients(clients: &ClientMap) -> std::sync::MutexGuard<'_, HashMap<ClientId, mpsc::UnboundedSender<String>>> {
    clients.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
struct ServerState {
    on_http: Option<HttpCallback>,
    on_message: Option<MessageCallback>,
    clients: ClientMap,
}

/// Loopback HTTP/WebSocket server running in a dedicated tokio task.
pub struct LocalServer {
    port: u16,
    clients: ClientMap,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LocalServer {
    /// Bind `127.0.0.1:<port>` and start serving.
    ///
    /// `port` 0 binds an OS-assigned ephemeral port. The WebSocket endpoint
    /// is served at `/ws/<protocol>`; every other path goes through the HTTP
    /// callback.
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] when the port is unavailable; the
    /// caller may retry with a different port.
    pub async fn start(
        port: u16,
        protocol: &str,
        callbacks: ServerCallbacks,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        let port = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { port, source })?
            .port();

        let clients: ClientMap = Arc::new(Mutex::new(HashMap::new()));
        let state = ServerState {
            on_http: callbacks.on_http,
            on_message: callbacks.on_message,
            clients: clients.clone(),
        };

        let ws_path = format!("/ws/{protocol}");
        let app = Router::new()
            .route(&ws_path, get(handle_ws_upgrade))
            .fallback(handle_http)
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!(error = %err, "local server error");
            }
        });

        debug!(port, "local server started");
        Ok(Self { port, clients, shutdown_tx: Some(shutdown_tx), handle: Some(handle) })
    }

    /// Port the server is bound to.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of currently connected WebSocket clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        lock_clients(&self.clients).len()
    }

    /// Queue a text payload for one client, or for all clients when `target`
    /// is `None`.
    ///
    /// Enqueuing wakes the per-client writer task; clients whose queue is
    /// gone are dropped from the registry.
    pub fn send(&self, target: Option<ClientId>, payload: &str) {
        let mut clients = lock_clients(&self.clients);
        match target {
            Some(id) => {
                let stale = match clients.get(&id) {
                    Some(tx) => tx.send(payload.to_string()).is_err(),
                    None => false,
                };
                if stale {
                    clients.remove(&id);
                }
            }
            None => clients.retain(|_, tx| tx.send(payload.to_string()).is_ok()),
        }
    }

    /// Stop the server: signal graceful shutdown, then wait for the task.
    ///
    /// Idempotent; a second call returns immediately. If the task does not
    /// finish within a grace period it is aborted.
    ///
    /// # Errors
    /// Returns [`ServerError::Task`] when the server task panicked.
    pub async fn shutdown(&mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            let abort = handle.abort_handle();
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.is_panic() => {
                    return Err(ServerError::Task(err.to_string()));
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!(port = self.port, "local server did not stop in time, aborting");
                    abort.abort();
                }
            }
        }

        Ok(())
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

async fn handle_http(State(state): State<ServerState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let params: HashMap<String, String> = uri
        .query()
        .map(|query| url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let reply = state.on_http.as_ref().and_then(|cb| cb(uri.path(), &params));
    match reply {
        Some(reply) => {
            (reply.status, [(header::CONTENT_TYPE, reply.content_type)], reply.body).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: ServerState, socket: WebSocket) {
    let client_id = Uuid::new_v4();
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
    lock_clients(&state.clients).insert(client_id, outgoing_tx);
    debug!(%client_id, "websocket client connected");

    let (mut sink, mut stream) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = outgoing_rx.recv().await {
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if text.len() > WS_MAX_FRAME_BYTES {
                    warn!(%client_id, len = text.len(), "oversized websocket frame, closing connection");
                    break;
                }
                if let Some(cb) = state.on_message.as_ref() {
                    cb(client_id, text.to_string());
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    writer.abort();
    lock_clients(&state.clients).remove(&client_id);
    debug!(%client_id, "websocket client disconnected");
}
