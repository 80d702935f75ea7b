//! TLS transport
//!
//! Certificates are loaded once at startup with [`load_server_config`];
//! a bad certificate or key stops the process before anything is bound.
//! Each accepted socket is handshaken on its own task, so a slow or broken
//! client never holds up the accept loop.

use super::serve::serve;
use super::{TlsPaths, Transport};
use crate::error::ConfigError;
use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

/// Build a rustls server configuration from PEM files
///
/// The certificate file may hold a full chain. ALPN offers `h2` and
/// `http/1.1`.
///
/// # Errors
///
/// [`ConfigError::UnreadableFile`] if a file cannot be opened and
/// [`ConfigError::Tls`] if it does not contain usable PEM material.
pub fn load_server_config(paths: &TlsPaths) -> Result<Arc<ServerConfig>, ConfigError> {
    let certs = load_certs(&paths.cert_path)?;
    let key = load_key(&paths.key_path)?;

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| ConfigError::Tls(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ConfigError::Tls(format!("invalid certificate or key: {e}")))?;

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

fn open(path: &Path) -> Result<BufReader<File>, ConfigError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ConfigError::UnreadableFile {
            path: path.to_path_buf(),
            source,
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::Tls(format!("{}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(ConfigError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| ConfigError::Tls(format!("{}: {e}", path.display())))?
        .ok_or_else(|| ConfigError::Tls(format!("no private key found in {}", path.display())))
}

/// HTTPS transport
pub struct TlsTransport {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    grace: Duration,
}

impl TlsTransport {
    pub fn new(listener: TcpListener, config: Arc<ServerConfig>, grace: Duration) -> Self {
        Self {
            listener,
            config,
            grace,
        }
    }
}

#[async_trait]
impl Transport for TlsTransport {
    async fn start(self, app: Router, shutdown: CancellationToken) -> Result<()> {
        let TlsTransport {
            listener,
            config,
            grace,
        } = self;
        let acceptor = TlsAcceptor::from(config);

        tracing::info!("HTTPS server listening on {}", listener.local_addr()?);

        serve(listener, app, shutdown, grace, move |stream| {
            acceptor.accept(stream)
        })
        .await
    }
}
