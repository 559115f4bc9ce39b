use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::core::pipeline::{Completion, Outbound, PendingSend, SendQueue};
use crate::traits::{Message, Result, SocketError};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{oneshot, Notify};
use tracing::debug;

/// Longest close reason that fits a control frame next to the status code
pub const MAX_CLOSE_REASON_BYTES: usize = 123;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide connection identity, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Check that a close frame may be sent with this code and reason
pub fn validate_close(code: u16, reason: &str) -> Result<()> {
    if !matches!(code, 1000..=1003 | 1007..=1013 | 3000..=4999) {
        return Err(SocketError::InvalidCloseCode(code));
    }
    if reason.len() > MAX_CLOSE_REASON_BYTES {
        return Err(SocketError::InvalidCloseReason(reason.len()));
    }
    Ok(())
}

/// Everything known about a connection when its handshake completes
pub(crate) struct ConnectionParts {
    pub path: String,
    pub path_match: Vec<Option<String>>,
    pub endpoint: Option<String>,
    pub remote_addr: Option<SocketAddr>,
    pub runtime: Handle,
}

impl ConnectionParts {
    pub(crate) fn new(runtime: Handle) -> Self {
        Self {
            path: String::from("/"),
            path_match: Vec::new(),
            endpoint: None,
            remote_addr: None,
            runtime,
        }
    }
}

struct ConnectionInner {
    id: ConnectionId,
    state: AtomicConnectionState,
    metrics: AtomicMetrics,
    path: String,
    path_match: Vec<Option<String>>,
    endpoint: Option<String>,
    remote_addr: Option<SocketAddr>,
    queue: SendQueue,
    closing: Notify,
    remote_closed: AtomicBool,
}

/// One WebSocket session
///
/// Cheap to clone; all clones refer to the same session. Two connections
/// compare equal only if they share an id.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub(crate) fn new(parts: ConnectionParts) -> (Self, UnboundedReceiver<Outbound>) {
        let (queue, rx) = SendQueue::channel(parts.runtime);
        let inner = ConnectionInner {
            id: ConnectionId::next(),
            state: AtomicConnectionState::new(ConnectionState::Connecting),
            metrics: AtomicMetrics::new(),
            path: parts.path,
            path_match: parts.path_match,
            endpoint: parts.endpoint,
            remote_addr: parts.remote_addr,
            queue,
            closing: Notify::new(),
            remote_closed: AtomicBool::new(false),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.inner.state.is_open()
    }

    /// Request path of the upgrade, without the query string
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Capture groups of the route pattern; index 0 is the whole path
    pub fn path_match(&self) -> &[Option<String>] {
        &self.inner.path_match
    }

    /// Pattern of the endpoint this connection was routed to
    pub fn endpoint(&self) -> Option<&str> {
        self.inner.endpoint.as_deref()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    pub fn metrics(&self) -> &AtomicMetrics {
        &self.inner.metrics
    }

    pub fn messages_sent(&self) -> u64 {
        self.inner.metrics.messages_sent()
    }

    pub fn messages_received(&self) -> u64 {
        self.inner.metrics.messages_received()
    }

    /// Queue a message without waiting for the outcome
    pub fn send(&self, message: impl Into<Message>) {
        self.submit(message.into(), None);
    }

    /// Queue a message; `completion` runs once the write finished or failed
    ///
    /// The completion never runs on the caller's stack.
    pub fn send_with<F>(&self, message: impl Into<Message>, completion: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.submit(message.into(), Some(Box::new(completion)));
    }

    /// Queue a message and wait for it to reach the transport
    pub async fn send_and_wait(&self, message: impl Into<Message>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send_with(message, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(SocketError::ConnectionClosed))
    }

    fn submit(&self, message: Message, completion: Option<Completion>) {
        match self.state() {
            ConnectionState::Open => self.inner.queue.submit(message, completion),
            state => {
                let error = match state {
                    ConnectionState::Connecting => SocketError::NotConnected,
                    ConnectionState::Closing => SocketError::ConnectionClosing,
                    _ => SocketError::ConnectionClosed,
                };
                self.inner
                    .queue
                    .reject(PendingSend::new(completion), error);
            }
        }
    }

    /// Start the close handshake
    ///
    /// Messages queued before this call are written before the close frame;
    /// later sends fail with `ConnectionClosing`.
    pub fn close(&self, code: u16, reason: &str) -> Result<()> {
        validate_close(code, reason)?;
        if !self
            .inner
            .state
            .compare_exchange(ConnectionState::Open, ConnectionState::Closing)
        {
            return match self.state() {
                ConnectionState::Connecting => Err(SocketError::NotConnected),
                ConnectionState::Closing => Err(SocketError::ConnectionClosing),
                _ => Err(SocketError::ConnectionClosed),
            };
        }
        debug!("Connection {} closing with {}", self.id(), code);
        self.inner.queue.control(Outbound::Close {
            code,
            reason: reason.to_owned(),
        });
        self.inner.closing.notify_one();
        Ok(())
    }

    /// Send a close frame regardless of the current state, used on faults
    pub(crate) fn force_close(&self, code: u16, reason: &str) {
        if self.inner.state.get() != ConnectionState::Closed {
            self.inner.state.set(ConnectionState::Closing);
        }
        self.inner.queue.control(Outbound::Close {
            code,
            reason: reason.to_owned(),
        });
        self.inner.closing.notify_one();
    }

    pub(crate) fn mark_open(&self) -> bool {
        self.inner
            .state
            .compare_exchange(ConnectionState::Connecting, ConnectionState::Open)
    }

    pub(crate) fn mark_closed(&self) {
        self.inner.state.set(ConnectionState::Closed);
    }

    /// Record a close frame from the peer; the codec sends the reply
    pub(crate) fn mark_remote_closed(&self) {
        self.inner.remote_closed.store(true, Ordering::Release);
        self.inner
            .state
            .compare_exchange(ConnectionState::Open, ConnectionState::Closing);
        self.inner.closing.notify_one();
    }

    pub(crate) fn remote_closed(&self) -> bool {
        self.inner.remote_closed.load(Ordering::Acquire)
    }

    pub(crate) fn queue(&self) -> &SendQueue {
        &self.inner.queue
    }

    /// Resolves after `close` or a peer close frame
    pub(crate) async fn closing(&self) {
        self.inner.closing.notified().await
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("path", &self.path())
            .field("remote_addr", &self.remote_addr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_connection() -> (Connection, UnboundedReceiver<Outbound>) {
        let (connection, rx) = Connection::new(ConnectionParts::new(Handle::current()));
        assert!(connection.mark_open());
        (connection, rx)
    }

    #[test]
    fn test_close_validation() {
        assert!(validate_close(1000, "").is_ok());
        assert!(validate_close(1013, "").is_ok());
        assert!(validate_close(4999, "bye").is_ok());
        assert_eq!(validate_close(999, ""), Err(SocketError::InvalidCloseCode(999)));
        assert_eq!(validate_close(1005, ""), Err(SocketError::InvalidCloseCode(1005)));
        assert_eq!(validate_close(1006, ""), Err(SocketError::InvalidCloseCode(1006)));
        assert_eq!(validate_close(2000, ""), Err(SocketError::InvalidCloseCode(2000)));
        assert_eq!(validate_close(5000, ""), Err(SocketError::InvalidCloseCode(5000)));

        let long = "x".repeat(124);
        assert_eq!(validate_close(1000, &long), Err(SocketError::InvalidCloseReason(124)));
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_increasing() {
        let (a, _rx_a) = Connection::new(ConnectionParts::new(Handle::current()));
        let (b, _rx_b) = Connection::new(ConnectionParts::new(Handle::current()));
        assert!(b.id() > a.id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[tokio::test]
    async fn test_send_before_open_reports_not_connected() {
        let (connection, _rx) = Connection::new(ConnectionParts::new(Handle::current()));
        let result = connection.send_and_wait("early").await;
        assert_eq!(result, Err(SocketError::NotConnected));
    }

    #[tokio::test]
    async fn test_close_moves_to_closing_and_queues_frame() {
        let (connection, mut rx) = open_connection();
        connection.send("first");
        connection.close(1000, "done").unwrap();
        assert_eq!(connection.state(), ConnectionState::Closing);

        assert!(matches!(rx.recv().await, Some(Outbound::Data { .. })));
        match rx.recv().await {
            Some(Outbound::Close { code, reason }) => {
                assert_eq!(code, 1000);
                assert_eq!(reason, "done");
            }
            _ => panic!("expected close frame after queued data"),
        }
    }

    #[tokio::test]
    async fn test_send_while_closing_fails_once() {
        let (connection, _rx) = open_connection();
        connection.close(1000, "").unwrap();

        let (tx, mut results) = tokio::sync::mpsc::unbounded_channel();
        connection.send_with("late", move |result| {
            let _ = tx.send(result);
        });

        assert_eq!(results.recv().await, Some(Err(SocketError::ConnectionClosing)));
        // Sender dropped after the single call
        assert_eq!(results.recv().await, None);
    }

    #[tokio::test]
    async fn test_second_close_is_rejected() {
        let (connection, _rx) = open_connection();
        connection.close(1000, "").unwrap();
        assert_eq!(connection.close(1000, ""), Err(SocketError::ConnectionClosing));
        assert_eq!(connection.close(1, ""), Err(SocketError::InvalidCloseCode(1)));
    }
}
