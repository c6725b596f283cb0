//! Network side of the bridge.
//!
//! The listener runs axum on its own thread. Everything it learns about a
//! connection is pushed onto a single event queue that the owning
//! [`Inspector`](crate::Inspector) drains from its tick, so network I/O never
//! touches the engine directly.

use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use axum::{
    Router,
    extract::{
        FromRequestParts, Request, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    discovery::{DiscoveryDocuments, TargetInfo},
    registry::ConnectionId,
};

/// Connection activity, in the order it happened.
#[derive(Debug)]
pub enum TransportEvent {
    /// A debugger connected; outbound text for it goes into `sink`.
    Open {
        id: ConnectionId,
        sink: mpsc::UnboundedSender<String>,
    },
    /// One complete inbound frame.
    Message { id: ConnectionId, payload: Vec<u8> },
    Failure { id: ConnectionId, reason: String },
    Close { id: ConnectionId },
}

impl TransportEvent {
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            TransportEvent::Open { id, .. }
            | TransportEvent::Message { id, .. }
            | TransportEvent::Failure { id, .. }
            | TransportEvent::Close { id } => *id,
        }
    }
}

#[derive(Clone)]
struct TransportState {
    events: mpsc::UnboundedSender<TransportEvent>,
    discovery: Arc<DiscoveryDocuments>,
}

/// Builds the router: WebSocket upgrades on any path, discovery otherwise.
pub fn router(
    events: mpsc::UnboundedSender<TransportEvent>,
    discovery: Arc<DiscoveryDocuments>,
) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(TransportState { events, discovery })
}

async fn handle_request(State(state): State<TransportState>, request: Request) -> Response {
    let (mut parts, _body) = request.into_parts();

    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => {
            let events = state.events.clone();
            ws.on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {e}"))
                .on_upgrade(move |socket| ConnectionHandler::new(socket, events).run())
        }
        Err(_) => {
            debug!(path = %parts.uri.path(), "Discovery request");
            state.discovery.respond(parts.uri.path()).into_response()
        }
    }
}

/// Pumps one WebSocket connection into the event queue.
pub(crate) struct ConnectionHandler {
    socket: WebSocket,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ConnectionHandler {
    pub(crate) fn new(socket: WebSocket, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { socket, events }
    }

    pub(crate) async fn run(self) {
        let Self { socket, events } = self;
        let id = ConnectionId::new();
        let (mut ws_sender, mut ws_receiver) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        if events.send(TransportEvent::Open { id, sink: tx }).is_err() {
            debug!(connection_id = %id, "Inspector gone, refusing connection");
            return;
        }
        info!(connection_id = %id, "Debugger connected");

        // Ends when the bridge drops the sink or the socket breaks
        let send_task = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                    warn!(connection_id = %id, "Failed to send message: {e}");
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        while let Some(msg) = ws_receiver.next().await {
            let payload = match msg {
                Ok(Message::Text(text)) => text.as_str().as_bytes().to_vec(),
                Ok(Message::Binary(data)) => data.to_vec(),
                Ok(Message::Close(_)) => {
                    debug!(connection_id = %id, "Client closed connection");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    let _ = events.send(TransportEvent::Failure {
                        id,
                        reason: e.to_string(),
                    });
                    break;
                }
            };

            if events
                .send(TransportEvent::Message { id, payload })
                .is_err()
            {
                break;
            }
        }

        send_task.abort();
        let _ = events.send(TransportEvent::Close { id });
        info!(connection_id = %id, "Debugger disconnected");
    }
}

/// A bound listener serving discovery and WebSocket traffic on a background
/// thread. Dropping it stops accepting and joins the thread.
pub struct TransportListener {
    port: u16,
    discovery: Arc<DiscoveryDocuments>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TransportListener {
    /// Binds `host:port` and starts serving. Port 0 picks an ephemeral port.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be bound or the server thread cannot be
    /// started.
    pub fn start(
        host: &str,
        port: u16,
        target: &TargetInfo,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> io::Result<Self> {
        let listener = std::net::TcpListener::bind((host, port))?;
        listener.set_nonblocking(true)?;
        let local_addr: SocketAddr = listener.local_addr()?;
        let port = local_addr.port();

        let discovery = Arc::new(DiscoveryDocuments::new(port, target));
        let app = router(events, Arc::clone(&discovery));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(format!("inspector-{port}"))
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(e) => {
                            error!("Failed to register inspector listener: {e}");
                            return;
                        }
                    };

                    tokio::select! {
                        result = axum::serve(listener, app).into_future() => {
                            if let Err(e) = result {
                                error!("Inspector transport stopped: {e}");
                            }
                        }
                        _ = shutdown_rx => {
                            debug!("Inspector transport shutting down");
                        }
                    }
                });
            })?;

        info!("Inspector listening on {local_addr}");

        Ok(Self {
            port,
            discovery,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn discovery(&self) -> &Arc<DiscoveryDocuments> {
        &self.discovery
    }

    /// Stops accepting connections. Open connections are torn down with the
    /// server runtime.
    pub fn stop_accepting(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    /// Stops the server and waits for its thread to exit.
    pub fn join(&mut self) {
        self.stop_accepting();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("Inspector transport thread panicked");
        }
    }
}

impl Drop for TransportListener {
    fn drop(&mut self) {
        self.join();
    }
}

impl std::fmt::Debug for TransportListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportListener")
            .field("port", &self.port)
            .field("running", &self.thread.is_some())
            .finish_non_exhaustive()
    }
}

/// In-process debugger connection sharing the network event queue.
///
/// Cloneable and `Send`; the connection closes when the last clone drops.
#[derive(Debug, Clone)]
pub struct LocalConnection {
    inner: Arc<LocalInner>,
}

#[derive(Debug)]
struct LocalInner {
    id: ConnectionId,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl LocalConnection {
    pub(crate) fn open(
        events: mpsc::UnboundedSender<TransportEvent>,
        sink: mpsc::UnboundedSender<String>,
    ) -> Option<Self> {
        let id = ConnectionId::new();
        events.send(TransportEvent::Open { id, sink }).ok()?;
        debug!(connection_id = %id, "Local debugger connected");

        Some(Self {
            inner: Arc::new(LocalInner { id, events }),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Queues a protocol message for the next tick. Returns false once the
    /// inspector is closed.
    pub fn send(&self, message: impl Into<String>) -> bool {
        self.inner
            .events
            .send(TransportEvent::Message {
                id: self.inner.id,
                payload: message.into().into_bytes(),
            })
            .is_ok()
    }
}

impl Drop for LocalInner {
    fn drop(&mut self) {
        let _ = self.events.send(TransportEvent::Close { id: self.id });
    }
}
