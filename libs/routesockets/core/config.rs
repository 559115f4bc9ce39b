use crate::traits::SocketError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for SocketError {
    fn from(error: ConfigError) -> Self {
        SocketError::Configuration(error.to_string())
    }
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

/// Timers and limits shared by server and client connections
///
/// All durations are whole seconds; `0` disables the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadline for the upgrade handshake (and TLS negotiation)
    pub timeout_request_secs: u64,
    /// Close with 1000 after this long without an inbound message
    pub timeout_idle_secs: u64,
    /// Interval between keep-alive pings
    pub ping_interval_secs: u64,
    /// A ping without pong for this long is a transport fault
    pub pong_timeout_secs: u64,
    /// How long to wait for the peer's close frame before tearing down
    pub close_timeout_secs: u64,
    /// Largest accepted message in bytes, `None` keeps the codec default
    pub max_message_size: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_request_secs: 5,
            timeout_idle_secs: 0,
            ping_interval_secs: 0,
            pong_timeout_secs: 0,
            close_timeout_secs: 5,
            max_message_size: None,
        }
    }
}

impl SessionConfig {
    pub fn timeout_request(&self) -> Option<Duration> {
        secs(self.timeout_request_secs)
    }

    pub fn timeout_idle(&self) -> Option<Duration> {
        secs(self.timeout_idle_secs)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Option<Duration> {
        secs(self.pong_timeout_secs)
    }

    pub fn close_timeout(&self) -> Option<Duration> {
        secs(self.close_timeout_secs)
    }

    /// Codec settings derived from the limits
    pub fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        if let Some(limit) = self.max_message_size {
            config.max_message_size = Some(limit);
            config.max_frame_size = Some(limit);
        }
        config
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size == Some(0) {
            return Err(ConfigError::ValidationError(
                "max_message_size must be greater than 0".to_string(),
            ));
        }
        if self.pong_timeout_secs > 0 && self.ping_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pong_timeout_secs requires ping_interval_secs".to_string(),
            ));
        }
        Ok(())
    }
}

/// PEM certificate chain and PKCS#8 private key for `wss://`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
}

/// Server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    /// Port to listen on, `0` picks a free one
    pub port: u16,
    /// Worker threads used by `start()`
    pub threads: usize,
    /// Serve `wss://` when present
    pub tls: Option<TlsConfig>,
    #[serde(flatten)]
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
            threads: 1,
            tls: None,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml_content = std::fs::read_to_string(config_path.as_ref())?;
        let config = Self::from_yaml_str(&yaml_content)?;
        info!("Loaded server config from {}", config_path.as_ref().display());
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn is_secure(&self) -> bool {
        self.tls.is_some()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::ValidationError(
                "threads must be at least 1".to_string(),
            ));
        }
        if self.address.is_empty() {
            return Err(ConfigError::ValidationError(
                "address must not be empty".to_string(),
            ));
        }
        self.session.validate()
    }
}

/// Client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target, e.g. `localhost:8080/echo`; `ws://` is assumed without a scheme
    pub uri: String,
    /// Reject servers whose certificate does not verify
    pub verify_certificate: bool,
    /// Worker threads used by `start()`
    pub threads: usize,
    #[serde(flatten)]
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            verify_certificate: true,
            threads: 1,
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml_content = std::fs::read_to_string(config_path.as_ref())?;
        let config = Self::from_yaml_str(&yaml_content)?;
        info!("Loaded client config from {}", config_path.as_ref().display());
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Target URL with the scheme filled in
    pub fn url(&self) -> String {
        if self.uri.contains("://") {
            self.uri.clone()
        } else {
            format!("ws://{}", self.uri)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uri.is_empty() {
            return Err(ConfigError::ValidationError("uri must not be empty".to_string()));
        }
        let url = self.url();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "unsupported scheme in {}",
                self.uri
            )));
        }
        if self.threads == 0 {
            return Err(ConfigError::ValidationError(
                "threads must be at least 1".to_string(),
            ));
        }
        self.session.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_yaml_fills_defaults() {
        let config = ServerConfig::from_yaml_str("port: 9001\nthreads: 4\n").unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.threads, 4);
        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.session.timeout_request(), Some(Duration::from_secs(5)));
        assert_eq!(config.session.timeout_idle(), None);
        assert!(!config.is_secure());
    }

    #[test]
    fn test_session_fields_are_flattened() {
        let yaml = "port: 0\ntimeout_idle_secs: 30\nping_interval_secs: 10\npong_timeout_secs: 25\nmax_message_size: 1024\n";
        let config = ServerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.session.timeout_idle(), Some(Duration::from_secs(30)));
        assert_eq!(config.session.ping_interval(), Some(Duration::from_secs(10)));
        assert_eq!(config.session.websocket_config().max_message_size, Some(1024));
    }

    #[test]
    fn test_tls_section() {
        let yaml = "tls:\n  certificate: server.crt\n  private_key: server.key\n";
        let config = ServerConfig::from_yaml_str(yaml).unwrap();
        let tls = config.tls.unwrap();
        assert_eq!(tls.certificate, PathBuf::from("server.crt"));
        assert_eq!(tls.private_key, PathBuf::from("server.key"));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let error = ServerConfig::from_yaml_str("threads: 0\n").unwrap_err();
        assert!(matches!(error, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_pong_timeout_requires_ping() {
        let error = ClientConfig::from_yaml_str("uri: localhost:8080/echo\npong_timeout_secs: 5\n")
            .unwrap_err();
        assert!(matches!(error, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_client_url_gets_scheme() {
        let config = ClientConfig::from_yaml_str("uri: localhost:8080/echo\n").unwrap();
        assert_eq!(config.url(), "ws://localhost:8080/echo");
        assert!(config.verify_certificate);

        let config = ClientConfig::from_yaml_str("uri: wss://example.com/feed\n").unwrap();
        assert_eq!(config.url(), "wss://example.com/feed");
    }

    #[test]
    fn test_client_rejects_http_scheme() {
        assert!(ClientConfig::from_yaml_str("uri: http://example.com\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "uri: localhost:9000/chat\nverify_certificate: false\nclose_timeout_secs: 2").unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.uri, "localhost:9000/chat");
        assert!(!config.verify_certificate);
        assert_eq!(config.session.close_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_missing_file_is_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = ServerConfig::load(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(error, ConfigError::FileError(_)));
    }
}
