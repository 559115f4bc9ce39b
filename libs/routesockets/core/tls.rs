use crate::core::config::TlsConfig;
use crate::traits::{Result, SocketError};
use tokio_tungstenite::Connector;
use tracing::{info, warn};

/// Build the server-side acceptor from a PEM certificate chain and PKCS#8 key
pub fn load_acceptor(config: &TlsConfig) -> Result<tokio_native_tls::TlsAcceptor> {
    let certificate = std::fs::read(&config.certificate).map_err(|e| {
        SocketError::Tls(format!("reading {}: {}", config.certificate.display(), e))
    })?;
    let private_key = std::fs::read(&config.private_key).map_err(|e| {
        SocketError::Tls(format!("reading {}: {}", config.private_key.display(), e))
    })?;

    let identity = native_tls::Identity::from_pkcs8(&certificate, &private_key)?;
    let acceptor = native_tls::TlsAcceptor::new(identity)?;
    info!("Loaded TLS certificate from {}", config.certificate.display());
    Ok(tokio_native_tls::TlsAcceptor::from(acceptor))
}

/// Client-side connector; `None` uses the default verifying connector
pub fn client_connector(verify_certificate: bool) -> Result<Option<Connector>> {
    if verify_certificate {
        return Ok(None);
    }

    warn!("Certificate verification disabled");
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;
    Ok(Some(Connector::NativeTls(connector)))
}
