use crate::core::builder::{states::NoPort, ServerBuilder};
use crate::core::config::ServerConfig;
use crate::core::connection::{Connection, ConnectionParts};
use crate::core::dispatcher::Dispatcher;
use crate::core::session::{run_session, with_deadline};
use crate::core::tls;
use crate::server::endpoint::{EndpointHandle, EndpointTable};
use crate::server::registry::ConnectionRegistry;
use crate::traits::{ConnectionEvents, Message, Result, SocketError, WsSink};
use crossbeam_channel::{bounded, Receiver, RecvError, Sender, TrySendError};
use futures::StreamExt;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_native_tls::TlsAcceptor;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info, warn};

/// Close code sent to every connection when the server stops
pub const CLOSE_GOING_AWAY: u16 = 1001;
const GOING_AWAY_REASON: &str = "server shutting down";

/// Server events kept until read; newer events are dropped beyond this
pub const EVENT_CAPACITY: usize = 1024;

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Server-level events that do not belong to any open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Listener bound and accepting
    Listening(SocketAddr),
    /// A client never reached `Open`
    HandshakeFailed {
        peer: SocketAddr,
        error: SocketError,
    },
    /// `accept()` failed; the loop backs off and continues
    AcceptFailed(String),
    /// Accept loop ended and every session finished
    Stopped,
}

struct ServerShared {
    config: ServerConfig,
    endpoints: EndpointTable,
    registry: ConnectionRegistry,
    event_tx: Sender<ServerEvent>,
    event_rx: Receiver<ServerEvent>,
    shutdown: Notify,
    stopping: AtomicBool,
    local_addr: RwLock<Option<SocketAddr>>,
}

impl ServerShared {
    fn emit(&self, event: ServerEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Event queue full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Cloneable handle passed to every endpoint callback
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<ServerShared>,
}

impl ServerHandle {
    /// Queue a message on `connection`
    pub fn send(&self, connection: &Connection, message: impl Into<Message>) {
        connection.send(message);
    }

    /// Queue a message; `completion` receives the outcome off the caller's stack
    pub fn send_with<F>(&self, connection: &Connection, message: impl Into<Message>, completion: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        connection.send_with(message, completion);
    }

    /// Start the close handshake on `connection`
    pub fn send_close(&self, connection: &Connection, code: u16, reason: &str) -> Result<()> {
        connection.close(code, reason)
    }

    /// Snapshot of the open connections, oldest first
    pub fn get_connections(&self) -> Vec<Connection> {
        self.shared.registry.snapshot()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Bound address while the server is running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.read()
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }

    /// Stop accepting and close every connection with 1001
    pub fn stop(&self) {
        if !self.shared.stopping.swap(true, Ordering::AcqRel) {
            info!("Stopping server");
        }
        self.shared.shutdown.notify_one();
    }
}

/// Endpoint-routing WebSocket server
///
/// # Example
/// ```ignore
/// let server = WebSocketServer::builder().port(8080).threads(4).build()?;
/// server.endpoint("^/echo/?$")?.on_message(|server, connection, message| {
///     server.send(connection, message);
/// });
/// server.start()?;
/// ```
#[derive(Clone)]
pub struct WebSocketServer {
    handle: ServerHandle,
}

impl WebSocketServer {
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let (event_tx, event_rx) = bounded(EVENT_CAPACITY);
        let shared = ServerShared {
            config,
            endpoints: EndpointTable::new(),
            registry: ConnectionRegistry::new(),
            event_tx,
            event_rx,
            shutdown: Notify::new(),
            stopping: AtomicBool::new(false),
            local_addr: RwLock::new(None),
        };
        Ok(Self {
            handle: ServerHandle {
                shared: Arc::new(shared),
            },
        })
    }

    pub fn builder() -> ServerBuilder<NoPort> {
        ServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.handle.shared.config
    }

    /// Register a route pattern, or get the endpoint already registered for it
    pub fn endpoint(&self, pattern: &str) -> Result<EndpointHandle> {
        self.handle.shared.endpoints.register(pattern)
    }

    pub fn endpoints(&self) -> &EndpointTable {
        &self.handle.shared.endpoints
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Build a runtime with `threads` workers and serve until `stop()`
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config().threads)
            .thread_name("routesockets-server")
            .enable_all()
            .build()
            .map_err(|e| SocketError::Configuration(format!("failed to build runtime: {}", e)))?;
        runtime.block_on(self.run())
    }

    /// Serve on the current runtime until `stop()`
    ///
    /// A `stop()` issued before `run()` is honoured by the next run, which
    /// returns right after binding. Once a run returned the server can be
    /// run again.
    pub async fn run(&self) -> Result<()> {
        let shared = &self.handle.shared;
        let config = &shared.config;

        let acceptor = match &config.tls {
            Some(tls_config) => Some(Arc::new(tls::load_acceptor(tls_config)?)),
            None => None,
        };

        let bind_addr = config.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| SocketError::Bind {
                addr: bind_addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| SocketError::Bind {
            addr: bind_addr.clone(),
            reason: e.to_string(),
        })?;
        *shared.local_addr.write() = Some(local_addr);

        let scheme = if acceptor.is_some() { "wss" } else { "ws" };
        info!("Listening on {}://{}", scheme, local_addr);
        shared.emit(ServerEvent::Listening(local_addr));

        let mut sessions = JoinSet::new();
        while !shared.stopping.load(Ordering::Acquire) {
            tokio::select! {
                _ = shared.shutdown.notified() => {}

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted TCP connection from {}", peer);
                        let _ = stream.set_nodelay(true);
                        sessions.spawn(serve_socket(
                            Arc::clone(shared),
                            stream,
                            peer,
                            acceptor.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        shared.emit(ServerEvent::AcceptFailed(e.to_string()));
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }
        drop(listener);

        let live = shared.registry.snapshot();
        info!("Closing {} connections", live.len());
        for connection in live {
            let _ = connection.close(CLOSE_GOING_AWAY, GOING_AWAY_REASON);
        }
        while sessions.join_next().await.is_some() {}

        *shared.local_addr.write() = None;
        // Ready to run again
        shared.stopping.store(false, Ordering::Release);
        info!("Server stopped");
        shared.emit(ServerEvent::Stopped);
        Ok(())
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn send(&self, connection: &Connection, message: impl Into<Message>) {
        self.handle.send(connection, message);
    }

    pub fn send_with<F>(&self, connection: &Connection, message: impl Into<Message>, completion: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.handle.send_with(connection, message, completion);
    }

    pub fn send_close(&self, connection: &Connection, code: u16, reason: &str) -> Result<()> {
        self.handle.send_close(connection, code, reason)
    }

    pub fn get_connections(&self) -> Vec<Connection> {
        self.handle.get_connections()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.local_addr()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<ServerEvent> {
        self.handle.shared.event_rx.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv_event(&self) -> std::result::Result<ServerEvent, RecvError> {
        self.handle.shared.event_rx.recv()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<ServerEvent> {
        self.handle.shared.event_rx.recv_timeout(timeout).ok()
    }
}

/// Keeps the registry in step with the session and forwards to the endpoint
struct EndpointDispatch {
    shared: Arc<ServerShared>,
    dispatcher: Dispatcher<ServerHandle>,
}

impl ConnectionEvents for EndpointDispatch {
    fn on_open(&self, connection: &Connection) {
        self.shared.registry.insert(connection.clone());
        // Opened after the stop snapshot was taken
        if self.shared.stopping.load(Ordering::Acquire) {
            let _ = connection.close(CLOSE_GOING_AWAY, GOING_AWAY_REASON);
        }
        self.dispatcher.on_open(connection);
    }

    fn on_message(&self, connection: &Connection, message: Message) {
        self.dispatcher.on_message(connection, message);
    }

    fn on_close(&self, connection: &Connection, code: u16, reason: &str) {
        self.shared.registry.remove(connection.id());
        self.dispatcher.on_close(connection, code, reason);
    }

    fn on_error(&self, connection: &Connection, error: &SocketError) {
        self.dispatcher.on_error(connection, error);
    }
}

async fn serve_socket(
    shared: Arc<ServerShared>,
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: Option<Arc<TlsAcceptor>>,
) {
    let result = match acceptor {
        Some(acceptor) => {
            let limit = shared.config.session.timeout_request();
            match with_deadline(limit, "TLS handshake", acceptor.accept(stream)).await {
                Ok(Ok(tls_stream)) => upgrade(Arc::clone(&shared), tls_stream, peer).await,
                Ok(Err(e)) => Err(SocketError::Tls(e.to_string())),
                Err(timeout) => Err(timeout),
            }
        }
        None => upgrade(Arc::clone(&shared), stream, peer).await,
    };

    if let Err(error) = result {
        warn!("Handshake with {} failed: {}", peer, error);
        shared.emit(ServerEvent::HandshakeFailed { peer, error });
    }
}

/// Route and upgrade one socket, then drive its session to the end
async fn upgrade<S>(shared: Arc<ServerShared>, stream: S, peer: SocketAddr) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut routed = None;
    let route_request = |request: &Request, response: Response| {
        let path = request.uri().path().to_string();
        match shared.endpoints.route(&path) {
            Some(route) => {
                routed = Some((route, path));
                Ok(response)
            }
            None => {
                debug!("No endpoint for {} from {}", path, peer);
                let mut rejection = ErrorResponse::new(Some(format!("no endpoint for {}", path)));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        }
    };

    let session_config = shared.config.session.clone();
    let ws_stream = with_deadline(
        session_config.timeout_request(),
        "upgrade handshake",
        accept_hdr_async_with_config(stream, route_request, Some(session_config.websocket_config())),
    )
    .await?
    .map_err(|e| SocketError::Handshake(e.to_string()))?;

    let (route, path) =
        routed.ok_or_else(|| SocketError::Handshake("request was not routed".to_string()))?;

    let mut parts = ConnectionParts::new(Handle::current());
    parts.path = path;
    parts.path_match = route.captures;
    parts.endpoint = Some(route.endpoint.pattern().to_string());
    parts.remote_addr = Some(peer);
    let (connection, outbound) = Connection::new(parts);

    let events = Arc::new(EndpointDispatch {
        shared: Arc::clone(&shared),
        dispatcher: Dispatcher::new(
            ServerHandle {
                shared: Arc::clone(&shared),
            },
            route.endpoint.slots(),
        ),
    });

    let (sink, reader) = ws_stream.split();
    run_session(
        connection,
        outbound,
        reader,
        WsSink::new(sink),
        events,
        session_config,
    )
    .await;
    Ok(())
}
