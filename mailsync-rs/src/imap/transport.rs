//! TLS transport for the IMAP client
//!
//! Opens the one socket a sync run lives on: TCP connect plus TLS
//! handshake, both bounded by the connect timeout. Failure here is the
//! only error that aborts a run before any protocol exchange.

use std::sync::Arc;
use std::time::Duration;

use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tracing::{debug, info};

use crate::error::{Result, SyncError};

fn build_connector() -> TlsConnector {
    let mut root_store = RootCertStore::empty();
    root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.0.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Open a TLS connection to `host:port` within `connect_timeout`.
pub async fn connect(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<TlsStream<TcpStream>> {
    let addr = format!("{}:{}", host, port);
    info!("Connecting to {}", addr);

    let connect_err = |source: std::io::Error| SyncError::Connect {
        host: host.to_string(),
        port,
        source,
    };

    let tcp = match timeout(connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(connect_err(e)),
        Err(_) => {
            return Err(connect_err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", connect_timeout),
            )))
        }
    };

    let server_name = ServerName::try_from(host).map_err(|e| {
        connect_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid server name: {}", e),
        ))
    })?;

    let connector = build_connector();
    let stream = match timeout(connect_timeout, connector.connect(server_name, tcp)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(connect_err(e)),
        Err(_) => {
            return Err(connect_err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("TLS handshake timed out after {:?}", connect_timeout),
            )))
        }
    };

    debug!("TLS session established with {}", addr);
    Ok(stream)
}
