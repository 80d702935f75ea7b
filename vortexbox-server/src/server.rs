//! Server assembly
//!
//! Wires configuration, store backends and the router together, then hands
//! the bound listener to the plaintext or TLS transport.

use crate::accounts::Accounts;
use crate::admission::{AdmissionController, IdentityResolver};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::store::{self, Backends};
use crate::transport::Transport;
use crate::transport::http::{self, AppState, HttpTransport};
use crate::transport::tls::{self, TlsTransport};
use crate::types::Quota;
use crate::upload::UploadStore;
use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A configured server, ready to run on a listener
pub struct Server {
    config: Config,
    tls: Option<Arc<rustls::ServerConfig>>,
    state: AppState,
}

impl Server {
    /// Build a server on the configured store backends
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the TLS material cannot be loaded, the upload directory
    /// cannot be created or the store URL is invalid. An unreachable Redis
    /// is not an error.
    pub fn new(config: Config) -> Result<Self> {
        let backends = store::create_backends(&config)?;
        Self::with_backends(config, backends)
    }

    /// Build a server on explicitly provided backends
    pub fn with_backends(config: Config, backends: Backends) -> Result<Self> {
        let tls = config
            .transport
            .tls
            .as_ref()
            .map(tls::load_server_config)
            .transpose()?;

        std::fs::create_dir_all(&config.upload.dir).with_context(|| {
            format!(
                "failed to create upload directory {}",
                config.upload.dir.display()
            )
        })?;

        let quota = Quota::new(config.admission.limit, config.admission.period)?;
        let metrics = Arc::new(Metrics::new());

        let state = AppState {
            admission: Arc::new(AdmissionController::new(
                backends.counters,
                quota,
                config.admission.failure_policy,
                config.store.key_prefix.clone(),
                metrics.clone(),
            )),
            identities: Arc::new(IdentityResolver::new(
                config.admission.key_granularity,
                config.admission.trust_forwarded_for,
                backends.accounts.clone(),
            )),
            accounts: Accounts::new(backends.accounts, config.accounts.session_ttl),
            uploads: Arc::new(UploadStore::new(
                config.upload.dir.clone(),
                config.upload.max_bytes,
                config.upload.require_session,
            )),
            metrics,
        };

        Ok(Self { config, tls, state })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.state.metrics.clone()
    }

    /// The application router, without a transport
    pub fn router(&self) -> Router {
        http::router(self.state.clone())
    }

    /// Serve on `listener` until `shutdown` is cancelled and in-flight
    /// requests have drained
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let app = self.router();
        let grace = self.config.shutdown_grace;

        match self.tls {
            Some(tls) => {
                TlsTransport::new(listener, tls, grace)
                    .start(app, shutdown)
                    .await
            }
            None => HttpTransport::new(listener, grace).start(app, shutdown).await,
        }
    }
}
