use thiserror::Error;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};

/// Main error type for routesockets
///
/// Errors are `Clone` so a single transport fault can be handed to every
/// completion that was waiting behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// Upgrade handshake was rejected or malformed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Peer sent a malformed frame
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Socket-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Send attempted after the close handshake started
    #[error("Connection is closing")]
    ConnectionClosing,

    /// Send attempted after the transport was released
    #[error("Connection closed")]
    ConnectionClosed,

    /// No connection has been established yet
    #[error("Not connected")]
    NotConnected,

    /// A user callback panicked
    #[error("Callback panicked: {0}")]
    CallbackPanicked(String),

    /// Route pattern failed to compile
    #[error("Invalid route pattern: {0}")]
    InvalidPattern(String),

    /// Close status code that may not be sent on the wire
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Close reason longer than a control frame allows
    #[error("Close reason is {0} bytes, at most 123 allowed")]
    InvalidCloseReason(usize),

    /// Certificate loading or TLS negotiation failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// Listener could not be bound
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl SocketError {
    /// True for errors reported by sends that never reached the transport
    pub fn is_send_rejected(&self) -> bool {
        matches!(
            self,
            SocketError::ConnectionClosing | SocketError::ConnectionClosed | SocketError::NotConnected
        )
    }

    /// True for faults that end the connection without a close handshake
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, SocketError::Transport(_) | SocketError::Timeout(_))
    }
}

impl From<WsError> for SocketError {
    fn from(error: WsError) -> Self {
        match error {
            WsError::ConnectionClosed | WsError::AlreadyClosed => SocketError::ConnectionClosed,
            WsError::Protocol(ProtocolError::SendAfterClosing) => SocketError::ConnectionClosing,
            WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                SocketError::Transport("connection reset without closing handshake".into())
            }
            WsError::Protocol(e) => SocketError::ProtocolViolation(e.to_string()),
            WsError::Utf8 => SocketError::ProtocolViolation("invalid UTF-8 in text frame".into()),
            WsError::Capacity(e) => SocketError::ProtocolViolation(e.to_string()),
            WsError::Io(e) => SocketError::Transport(e.to_string()),
            WsError::Http(response) => {
                SocketError::Handshake(format!("server responded with {}", response.status()))
            }
            WsError::HttpFormat(e) => SocketError::Handshake(e.to_string()),
            WsError::Url(e) => SocketError::Handshake(e.to_string()),
            other => SocketError::Transport(other.to_string()),
        }
    }
}

impl From<regex::Error> for SocketError {
    fn from(error: regex::Error) -> Self {
        SocketError::InvalidPattern(error.to_string())
    }
}

impl From<native_tls::Error> for SocketError {
    fn from(error: native_tls::Error) -> Self {
        SocketError::Tls(error.to_string())
    }
}

/// Result type for routesockets operations
pub type Result<T> = std::result::Result<T, SocketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_maps_to_transport_fault() {
        let error = SocketError::from(WsError::Protocol(
            ProtocolError::ResetWithoutClosingHandshake,
        ));
        assert!(error.is_transport_fault());
    }

    #[test]
    fn test_protocol_errors_map_to_violation() {
        let error = SocketError::from(WsError::Protocol(ProtocolError::NonZeroReservedBits));
        assert!(matches!(error, SocketError::ProtocolViolation(_)));

        let error = SocketError::from(WsError::Utf8);
        assert!(matches!(error, SocketError::ProtocolViolation(_)));
    }

    #[test]
    fn test_closed_errors_are_send_rejections() {
        assert!(SocketError::from(WsError::ConnectionClosed).is_send_rejected());
        assert!(SocketError::from(WsError::AlreadyClosed).is_send_rejected());
        assert!(
            SocketError::from(WsError::Protocol(ProtocolError::SendAfterClosing))
                .is_send_rejected()
        );
    }

    #[test]
    fn test_io_errors_are_transport_faults() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let error = SocketError::from(WsError::Io(io));
        assert!(error.is_transport_fault());
        assert!(!error.is_send_rejected());
    }
}
