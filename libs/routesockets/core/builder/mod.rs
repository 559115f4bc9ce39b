pub mod states;

use crate::client::WebSocketClient;
use crate::core::config::{ClientConfig, ServerConfig, TlsConfig};
use crate::server::WebSocketServer;
use crate::traits::Result;
use states::*;
use std::path::PathBuf;
use std::time::Duration;

/// Whole seconds, rounding a partial second up so short timers stay enabled
fn whole_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Type-state builder for [`WebSocketServer`]
///
/// The port is required; everything else has a default.
///
/// # Example
/// ```ignore
/// let server = WebSocketServer::builder()
///     .port(8080)
///     .threads(4)
///     .timeout_idle(Duration::from_secs(60))
///     .build()?;
/// ```
pub struct ServerBuilder<P: PortState> {
    _state: TypeState<P>,
    config: ServerConfig,
}

impl ServerBuilder<NoPort> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            config: ServerConfig::default(),
        }
    }

    /// Port to listen on; `0` picks a free port
    pub fn port(self, port: u16) -> ServerBuilder<HasPort> {
        let mut config = self.config;
        config.port = port;
        ServerBuilder {
            _state: TypeState::new(),
            config,
        }
    }
}

impl Default for ServerBuilder<NoPort> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PortState> ServerBuilder<P> {
    /// Interface to bind, default `0.0.0.0`
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    /// Worker threads of the runtime built by `start()`
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    /// Serve `wss://` with a PEM certificate chain and PKCS#8 private key
    pub fn tls(mut self, certificate: impl Into<PathBuf>, private_key: impl Into<PathBuf>) -> Self {
        self.config.tls = Some(TlsConfig {
            certificate: certificate.into(),
            private_key: private_key.into(),
        });
        self
    }

    pub fn timeout_request(mut self, timeout: Duration) -> Self {
        self.config.session.timeout_request_secs = whole_secs(timeout);
        self
    }

    pub fn timeout_idle(mut self, timeout: Duration) -> Self {
        self.config.session.timeout_idle_secs = whole_secs(timeout);
        self
    }

    /// Ping every `interval`; a pong missing for `pong_timeout` faults the connection
    pub fn ping_interval(mut self, interval: Duration, pong_timeout: Duration) -> Self {
        self.config.session.ping_interval_secs = whole_secs(interval);
        self.config.session.pong_timeout_secs = whole_secs(pong_timeout);
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.close_timeout_secs = whole_secs(timeout);
        self
    }

    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.config.session.max_message_size = Some(bytes);
        self
    }
}

impl ServerBuilder<HasPort> {
    /// Validate the configuration and create the server
    pub fn build(self) -> Result<WebSocketServer> {
        self.config.validate()?;
        WebSocketServer::new(self.config)
    }
}

/// Type-state builder for [`WebSocketClient`]
///
/// # Example
/// ```ignore
/// let client = WebSocketClient::builder()
///     .uri("localhost:8080/echo")
///     .verify_certificate(false)
///     .build()?;
/// ```
pub struct ClientBuilder<U: UriState> {
    _state: TypeState<U>,
    config: ClientConfig,
}

impl ClientBuilder<NoUri> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            config: ClientConfig::default(),
        }
    }

    /// Target such as `localhost:8080/echo` or `wss://host/path`
    pub fn uri(self, uri: impl Into<String>) -> ClientBuilder<HasUri> {
        let mut config = self.config;
        config.uri = uri.into();
        ClientBuilder {
            _state: TypeState::new(),
            config,
        }
    }
}

impl Default for ClientBuilder<NoUri> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: UriState> ClientBuilder<U> {
    /// Accept any server certificate when false
    pub fn verify_certificate(mut self, verify: bool) -> Self {
        self.config.verify_certificate = verify;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    pub fn timeout_request(mut self, timeout: Duration) -> Self {
        self.config.session.timeout_request_secs = whole_secs(timeout);
        self
    }

    pub fn timeout_idle(mut self, timeout: Duration) -> Self {
        self.config.session.timeout_idle_secs = whole_secs(timeout);
        self
    }

    pub fn ping_interval(mut self, interval: Duration, pong_timeout: Duration) -> Self {
        self.config.session.ping_interval_secs = whole_secs(interval);
        self.config.session.pong_timeout_secs = whole_secs(pong_timeout);
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.close_timeout_secs = whole_secs(timeout);
        self
    }

    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.config.session.max_message_size = Some(bytes);
        self
    }
}

impl ClientBuilder<HasUri> {
    /// Validate the configuration and create the client
    pub fn build(self) -> Result<WebSocketClient> {
        self.config.validate()?;
        WebSocketClient::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::SocketError;

    #[test]
    fn test_whole_secs_rounds_up() {
        assert_eq!(whole_secs(Duration::from_secs(3)), 3);
        assert_eq!(whole_secs(Duration::from_millis(1500)), 2);
        assert_eq!(whole_secs(Duration::from_millis(1)), 1);
        assert_eq!(whole_secs(Duration::ZERO), 0);
    }

    #[test]
    fn test_server_builder_sets_fields() {
        let server = ServerBuilder::new()
            .port(0)
            .address("127.0.0.1")
            .threads(2)
            .timeout_idle(Duration::from_secs(30))
            .ping_interval(Duration::from_secs(10), Duration::from_secs(20))
            .build()
            .unwrap();
        let config = server.config();
        assert_eq!(config.port, 0);
        assert_eq!(config.threads, 2);
        assert_eq!(config.session.timeout_idle_secs, 30);
        assert_eq!(config.session.pong_timeout_secs, 20);
    }

    #[test]
    fn test_server_builder_rejects_zero_threads() {
        let result = ServerBuilder::new().port(0).threads(0).build();
        assert!(matches!(result, Err(SocketError::Configuration(_))));
    }

    #[test]
    fn test_client_builder_requires_valid_scheme() {
        let result = ClientBuilder::new().uri("ftp://example.com").build();
        assert!(matches!(result, Err(SocketError::Configuration(_))));

        let client = ClientBuilder::new()
            .uri("localhost:8080/echo")
            .verify_certificate(false)
            .build()
            .unwrap();
        assert_eq!(client.config().url(), "ws://localhost:8080/echo");
        assert!(!client.config().verify_certificate);
    }
}
