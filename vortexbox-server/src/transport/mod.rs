//! Transport layer for the VortexBox server
//!
//! The same router is served either in plaintext or behind TLS; the choice
//! is made once at startup from the certificate flags.
//!
//! # Available Transports
//!
//! - [`http::HttpTransport`]: plaintext HTTP/1.1 and h2c
//! - [`tls::TlsTransport`]: HTTPS via rustls, with ALPN for HTTP/2

pub mod http;
mod serve;
pub mod tls;


use crate::error::ConfigError;
use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Listen address and optional TLS material, validated at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    /// Present only if both files could be opened for reading
    pub tls: Option<TlsPaths>,
}

impl TransportConfig {
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }
}

/// PEM certificate chain and private key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Validate the listen address and TLS flags
///
/// TLS is enabled only when both paths are given; giving one of them is an
/// error rather than a silent fallback to plaintext. No socket is opened
/// here.
///
/// # Errors
///
/// - [`ConfigError::InvalidValue`]: empty host or port 0
/// - [`ConfigError::IncompleteTlsPair`]: exactly one path given
/// - [`ConfigError::UnreadableFile`]: a path cannot be opened
pub fn configure(
    host: &str,
    port: u16,
    cert_path: Option<&Path>,
    key_path: Option<&Path>,
) -> Result<TransportConfig, ConfigError> {
    if host.trim().is_empty() {
        return Err(ConfigError::InvalidValue("host must not be empty".to_string()));
    }
    if port == 0 {
        return Err(ConfigError::InvalidValue(
            "port must be between 1 and 65535".to_string(),
        ));
    }

    let tls = match (cert_path, key_path) {
        (None, None) => None,
        (Some(_), None) => {
            return Err(ConfigError::IncompleteTlsPair {
                missing: "--ssl-private-key",
            });
        }
        (None, Some(_)) => {
            return Err(ConfigError::IncompleteTlsPair {
                missing: "--ssl-public-key",
            });
        }
        (Some(cert), Some(key)) => {
            ensure_readable(cert)?;
            ensure_readable(key)?;
            Some(TlsPaths {
                cert_path: cert.to_path_buf(),
                key_path: key.to_path_buf(),
            })
        }
    };

    Ok(TransportConfig {
        host: host.to_string(),
        port,
        tls,
    })
}

fn ensure_readable(path: &Path) -> Result<(), ConfigError> {
    File::open(path)
        .map(|_| ())
        .map_err(|source| ConfigError::UnreadableFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Common interface for the plaintext and TLS transports
#[async_trait]
pub trait Transport {
    /// Serve `app` until `shutdown` is cancelled
    ///
    /// On cancellation the transport stops accepting, lets in-flight
    /// requests finish within its grace period and then drops whatever is
    /// left.
    async fn start(self, app: Router, shutdown: CancellationToken) -> Result<()>;
}
