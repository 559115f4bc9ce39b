use crate::core::builder::{states::NoUri, ClientBuilder};
use crate::core::config::ClientConfig;
use crate::core::connection::{Connection, ConnectionParts};
use crate::core::dispatcher::{Dispatcher, HandlerSlots};
use crate::core::pipeline::{reject_later, PendingSend};
use crate::core::session::{run_session, with_deadline};
use crate::core::tls;
use crate::traits::{Message, Result, SocketError, WsSink};
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream};
use tracing::{debug, info, warn};

struct ClientShared {
    config: ClientConfig,
    slots: Arc<HandlerSlots<ClientHandle>>,
    connection: RwLock<Option<Connection>>,
    /// Runtime of the last `run()`, used to fail sends made while disconnected
    runtime: RwLock<Option<Handle>>,
}

/// Cloneable handle passed to every client callback
#[derive(Clone)]
pub struct ClientHandle {
    shared: Arc<ClientShared>,
}

impl ClientHandle {
    pub fn send(&self, connection: &Connection, message: impl Into<Message>) {
        connection.send(message);
    }

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

    /// The live connection, if the handshake completed and it has not closed
    pub fn connection(&self) -> Option<Connection> {
        self.shared.connection.read().clone()
    }
}

/// WebSocket client for a single outbound connection
///
/// # Example
/// ```ignore
/// let client = WebSocketClient::builder()
///     .uri("localhost:8080/echo")
///     .build()?;
/// client
///     .on_open(|client, connection| client.send(connection, "Hello"))
///     .on_message(|client, connection, message| {
///         println!("{}", message.string());
///         let _ = client.send_close(connection, 1000, "");
///     });
/// client.start()?;
/// ```
#[derive(Clone)]
pub struct WebSocketClient {
    handle: ClientHandle,
}

impl WebSocketClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let shared = ClientShared {
            config,
            slots: Arc::new(HandlerSlots::new()),
            connection: RwLock::new(None),
            runtime: RwLock::new(None),
        };
        Ok(Self {
            handle: ClientHandle {
                shared: Arc::new(shared),
            },
        })
    }

    pub fn builder() -> ClientBuilder<NoUri> {
        ClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.handle.shared.config
    }

    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    pub fn on_open<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ClientHandle, &Connection) + Send + Sync + 'static,
    {
        self.handle.shared.slots.set_on_open(handler);
        self
    }

    pub fn on_message<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ClientHandle, &Connection, Message) + Send + Sync + 'static,
    {
        self.handle.shared.slots.set_on_message(handler);
        self
    }

    pub fn on_close<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ClientHandle, &Connection, u16, &str) + Send + Sync + 'static,
    {
        self.handle.shared.slots.set_on_close(handler);
        self
    }

    pub fn on_error<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ClientHandle, &Connection, &SocketError) + Send + Sync + 'static,
    {
        self.handle.shared.slots.set_on_error(handler);
        self
    }

    pub fn connection(&self) -> Option<Connection> {
        self.handle.connection()
    }

    pub fn is_connected(&self) -> bool {
        self.connection().map(|c| c.is_open()).unwrap_or(false)
    }

    /// Queue a message on the live connection
    pub fn send(&self, message: impl Into<Message>) {
        match self.connection() {
            Some(connection) => connection.send(message),
            None => warn!("Send dropped, client is not connected"),
        }
    }

    /// Queue a message; without a connection the completion reports `NotConnected`
    pub fn send_with<F>(&self, message: impl Into<Message>, completion: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        match self.connection() {
            Some(connection) => connection.send_with(message, completion),
            None => {
                let runtime = self
                    .handle
                    .shared
                    .runtime
                    .read()
                    .clone()
                    .or_else(|| Handle::try_current().ok());
                reject_later(
                    runtime.as_ref(),
                    PendingSend::new(Some(Box::new(completion))),
                    SocketError::NotConnected,
                );
            }
        }
    }

    /// Start the close handshake on the live connection
    pub fn send_close(&self, code: u16, reason: &str) -> Result<()> {
        match self.connection() {
            Some(connection) => connection.close(code, reason),
            None => Err(SocketError::NotConnected),
        }
    }

    /// Build a runtime, connect, and block until the connection is closed
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config().threads)
            .thread_name("routesockets-client")
            .enable_all()
            .build()
            .map_err(|e| SocketError::Configuration(format!("failed to build runtime: {}", e)))?;
        runtime.block_on(self.run())
    }

    /// Connect and drive the connection on the current runtime
    ///
    /// A failed handshake returns `Err` without raising any callback.
    pub async fn run(&self) -> Result<()> {
        let shared = &self.handle.shared;
        let config = &shared.config;
        let url = config.url();
        *shared.runtime.write() = Some(Handle::current());

        let request = url
            .as_str()
            .into_client_request()
            .map_err(|e| SocketError::Handshake(e.to_string()))?;
        let path = request.uri().path().to_string();
        let connector = tls::client_connector(config.verify_certificate)?;

        info!("Connecting to {}", url);
        let (ws_stream, response) = with_deadline(
            config.session.timeout_request(),
            "connect",
            connect_async_tls_with_config(
                request,
                Some(config.session.websocket_config()),
                false,
                connector,
            ),
        )
        .await??;
        debug!("Handshake with {} answered {}", url, response.status());

        let remote_addr = match ws_stream.get_ref() {
            MaybeTlsStream::Plain(stream) => stream.peer_addr().ok(),
            _ => None,
        };

        let mut parts = ConnectionParts::new(Handle::current());
        parts.path = path;
        parts.remote_addr = remote_addr;
        let (connection, outbound) = Connection::new(parts);
        *shared.connection.write() = Some(connection.clone());

        let events = Arc::new(Dispatcher::new(
            self.handle.clone(),
            Arc::clone(&shared.slots),
        ));
        let (sink, reader) = ws_stream.split();
        run_session(
            connection,
            outbound,
            reader,
            WsSink::new(sink),
            events,
            config.session.clone(),
        )
        .await;

        *shared.connection.write() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client() -> WebSocketClient {
        WebSocketClient::builder().uri("127.0.0.1:1/echo").build().unwrap()
    }

    #[test]
    fn test_send_without_connection_reuses_one_thread() {
        let client = client();
        let (tx, rx) = crossbeam_channel::unbounded();
        for _ in 0..5 {
            let tx = tx.clone();
            client.send_with("nobody", move |result| {
                let _ = tx.send((result, std::thread::current().id()));
            });
        }

        let outcomes: Vec<_> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert!(outcomes.iter().all(|(r, _)| *r == Err(SocketError::NotConnected)));
        assert!(outcomes.iter().all(|(_, id)| *id == outcomes[0].1));
        assert_ne!(outcomes[0].1, std::thread::current().id());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_send_without_connection_completes_on_runtime() {
        let client = client();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let caller = std::thread::current().id();
        client.send_with("nobody", move |result| {
            let _ = tx.send((result, std::thread::current().id()));
        });

        // Current-thread runtime: the completion can only run once this task yields
        assert!(rx.try_recv().is_err());
        let (result, thread) = rx.await.unwrap();
        assert_eq!(result, Err(SocketError::NotConnected));
        assert_eq!(thread, caller);
        assert_eq!(client.send_close(1000, ""), Err(SocketError::NotConnected));
    }
}
