//! WebSocket transport server using Axum.
//!
//! Handles HTTP upgrade to WebSocket and drives one task per connection:
//! inbound frames are handed to the [`ConnectionHandler`] strictly in
//! order, outbound frames are drained from the connection's queue, and the
//! handler's disconnect hook runs exactly once when the session ends.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::Connection;

/// Trait implemented by the relay router. The transport calls
/// `handle_message` once per inbound frame, sequentially per connection,
/// and `handle_disconnect` exactly once when the session terminates for
/// any reason.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handle one inbound frame (raw bytes of a text or binary message).
    fn handle_message(
        &self,
        conn: &Connection,
        raw: &[u8],
    ) -> impl std::future::Future<Output = ()> + Send;

    /// Called once when the connection terminates, before its task exits.
    fn handle_disconnect(&self, conn: &Connection)
    -> impl std::future::Future<Output = ()> + Send;
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 8765,
            hostname: "0.0.0.0".into(),
            max_connections: Some(1024),
        }
    }
}

/// Errors raised while starting the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid bind address {addr}: {source}")]
    InvalidAddress {
        addr: String,
        source: std::net::AddrParseError,
    },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// Shared state for the transport server.
struct AppState<H: ConnectionHandler> {
    handler: Arc<H>,
    config: TransportConfig,
    /// Connected client count (for the connection limit and health check)
    client_count: Arc<AtomicUsize>,
}

/// The transport server — accepts WebSocket connections and runs one
/// connection task per session.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start the transport server with the given connection handler.
    pub async fn start<H: ConnectionHandler>(
        config: TransportConfig,
        handler: H,
    ) -> Result<Self, TransportError> {
        Self::start_shared(config, Arc::new(handler)).await
    }

    /// Start with a pre-shared handler, so the caller can keep a reference
    /// to it (e.g. for registry inspection).
    pub async fn start_shared<H: ConnectionHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, TransportError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let state = Arc::new(AppState {
            handler,
            config: config.clone(),
            client_count: Arc::new(AtomicUsize::new(0)),
        });

        let app = Router::new()
            .route("/ws", get(ws_upgrade_handler::<H>))
            .route("/health", get(health_handler::<H>))
            .with_state(state);

        let addr_str = format!("{}:{}", config.hostname, config.port);
        let addr: SocketAddr = addr_str.parse().map_err(|source| TransportError::InvalidAddress {
            addr: addr_str.clone(),
            source,
        })?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr_str.clone(),
                source,
            })?;
        let actual_port = listener
            .local_addr()
            .map_err(|source| TransportError::Bind {
                addr: addr_str,
                source,
            })?
            .port();

        info!("Relay transport listening on ws://{}:{}/ws", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Relay transport server stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler<H: ConnectionHandler>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    // Check connection limit
    if let Some(max) = state.config.max_connections {
        let current = state.client_count.load(Ordering::Relaxed);
        if current >= max {
            warn!("Connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

async fn health_handler<H: ConnectionHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.client_count.load(Ordering::Relaxed),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Task
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection<H: ConnectionHandler>(
    socket: WebSocket,
    state: Arc<AppState<H>>,
) {
    state.client_count.fetch_add(1, Ordering::Relaxed);

    let conn_id = uuid::Uuid::new_v4().to_string();
    info!("Client connected: {conn_id}");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outbound queue — other connections' tasks enqueue here via a
    // `Connection` clone; only this task touches the socket.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let conn = Connection::new(conn_id.clone(), outbound_tx);

    loop {
        tokio::select! {
            // Incoming WebSocket frame — handled to completion before the
            // next one is read, so registry effects are ordered per peer.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state.handler.handle_message(&conn, text.as_bytes()).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        state.handler.handle_message(&conn, &data).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client disconnected: {conn_id}");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {conn_id}: {e}");
                        break;
                    }
                    // Ping/pong frames are answered by the websocket layer.
                    Some(Ok(_)) => {}
                }
            }

            // Drain this connection's outbound queue. The pattern keeps the
            // branch disabled once the queue is closed; `conn` held above
            // keeps it open for the lifetime of the loop.
            Some(text) = outbound_rx.recv() => {
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    warn!("Failed to send to {conn_id}: {e}");
                    break;
                }
            }
        }
    }

    // Runs exactly once per connection, whatever broke the loop.
    state.handler.handle_disconnect(&conn).await;

    state.client_count.fetch_sub(1, Ordering::Relaxed);
    info!(
        "Connection finished: {conn_id} (total: {})",
        state.client_count.load(Ordering::Relaxed)
    );
}
