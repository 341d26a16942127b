//! QUIC transport over Quinn.
//!
//! TLS 1.3 via rustls with ALPN `vestibule/1`. The certificate comes from PEM
//! files, or is generated on the fly for local runs.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use quinn::{Endpoint, RecvStream, SendStream, ServerConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use vestibule_proto::ALPN_PROTOCOL;

use crate::error::ServerError;

/// Where the server certificate comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsIdentity {
    /// PEM-encoded certificate chain and private key on disk
    Pem {
        /// Certificate chain file
        cert: PathBuf,
        /// Private key file (PKCS#8, PKCS#1 or SEC1)
        key: PathBuf,
    },
    /// Self-signed certificate for `localhost`. Local testing only.
    SelfSigned,
}

impl TlsIdentity {
    /// PEM files when both paths are given, otherwise self-signed.
    pub fn from_paths(cert: Option<PathBuf>, key: Option<PathBuf>) -> Self {
        match (cert, key) {
            (Some(cert), Some(key)) => Self::Pem { cert, key },
            _ => Self::SelfSigned,
        }
    }
}

/// Bound QUIC endpoint accepting relay connections.
pub struct QuinnTransport {
    endpoint: Endpoint,
}

impl QuinnTransport {
    /// Bind a QUIC endpoint on `address`.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` if the address or TLS material is invalid
    /// - `ServerError::Transport` if the UDP socket cannot be bound
    pub fn bind(address: &str, identity: &TlsIdentity) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let (chain, key) = match identity {
            TlsIdentity::Pem { cert, key } => load_pem(cert, key)?,
            TlsIdentity::SelfSigned => {
                tracing::warn!("using self-signed certificate, not for production use");
                self_signed()?
            },
        };

        let endpoint = Endpoint::server(quic_config(chain, key)?, addr)
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(%addr, "QUIC endpoint bound");
        Ok(Self { endpoint })
    }

    /// Wait for the next completed handshake. `Ok(None)` once the endpoint
    /// is closed.
    ///
    /// # Errors
    ///
    /// - `ServerError::Transport` if the handshake failed
    pub async fn accept(&self) -> Result<Option<QuinnConnection>, ServerError> {
        let Some(incoming) = self.endpoint.accept().await else {
            return Ok(None);
        };

        let connection =
            incoming.await.map_err(|e| ServerError::Transport(format!("handshake failed: {e}")))?;

        Ok(Some(QuinnConnection { connection }))
    }

    /// Local address the endpoint is bound to.
    ///
    /// # Errors
    ///
    /// - `ServerError::Transport` if the socket address cannot be read
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.endpoint
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to read local address: {e}")))
    }

    /// Stop accepting and close every connection.
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"server shutdown");
    }
}

/// One client connection. Clones share the underlying QUIC connection.
#[derive(Clone)]
pub struct QuinnConnection {
    connection: quinn::Connection,
}

impl QuinnConnection {
    /// Wait for the client to open a bidirectional stream.
    ///
    /// # Errors
    ///
    /// - `ServerError::Transport` once the connection is closed
    pub async fn accept_bi(&self) -> Result<(SendStream, RecvStream), ServerError> {
        self.connection
            .accept_bi()
            .await
            .map_err(|e| ServerError::Transport(format!("connection closed: {e}")))
    }

    /// Open the server-to-client stream used for outbound frames.
    ///
    /// # Errors
    ///
    /// - `ServerError::Transport` if the connection is closed
    pub async fn open_uni(&self) -> Result<SendStream, ServerError> {
        self.connection
            .open_uni()
            .await
            .map_err(|e| ServerError::Transport(format!("open_uni failed: {e}")))
    }

    /// Remote peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Close with application error code 0 and `reason`.
    pub fn close(&self, reason: &str) {
        self.connection.close(0u32.into(), reason.as_bytes());
    }
}

fn load_pem(
    cert_path: &Path,
    key_path: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), ServerError> {
    let cert_pem = std::fs::read(cert_path).map_err(|e| {
        ServerError::Config(format!("failed to read cert '{}': {e}", cert_path.display()))
    })?;
    let key_pem = std::fs::read(key_path).map_err(|e| {
        ServerError::Config(format!("failed to read key '{}': {e}", key_path.display()))
    })?;

    let chain = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("failed to parse certificates: {e}")))?;
    if chain.is_empty() {
        return Err(ServerError::Config(format!(
            "no certificates in '{}'",
            cert_path.display()
        )));
    }

    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| ServerError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| {
            ServerError::Config(format!("no private key in '{}'", key_path.display()))
        })?;

    Ok((chain, key))
}

fn self_signed() -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), ServerError> {
    let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| ServerError::Config(format!("failed to generate self-signed cert: {e}")))?;

    let chain = vec![generated.cert.der().clone()];
    let key = PrivatePkcs8KeyDer::from(generated.key_pair.serialize_der()).into();
    Ok((chain, key))
}

fn quic_config(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig, ServerError> {
    let mut tls = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;
    tls.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls)
        .map_err(|e| ServerError::Config(format!("QUIC config error: {e}")))?;
    Ok(ServerConfig::with_crypto(Arc::new(crypto)))
}
