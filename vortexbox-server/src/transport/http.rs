//! HTTP routing and the plaintext transport
//!
//! # API Endpoints
//!
//! | Method | Path          | Handler                        |
//! |--------|---------------|--------------------------------|
//! | POST   | `/upload`     | [`crate::upload::upload`]      |
//! | GET    | `/files`      | [`crate::upload::list`]        |
//! | GET    | `/files/{id}` | [`crate::upload::download`]    |
//! | POST   | `/register`   | [`crate::accounts::register`]  |
//! | POST   | `/login`      | [`crate::accounts::login`]     |
//! | GET    | `/metrics`    | Prometheus text                |
//! | GET    | `/health`     | `OK`                           |
//!
//! Every route except `/health` sits behind [`crate::admission::enforce`],
//! so a rejected request never reaches a handler.

use super::Transport;
use super::serve::serve;
use crate::accounts::{self, Accounts};
use crate::admission::{self, AdmissionController, IdentityResolver};
use crate::metrics::Metrics;
use crate::upload::{self, UploadStore};
use anyhow::Result;
use async_trait::async_trait;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub admission: Arc<AdmissionController>,
    pub identities: Arc<IdentityResolver>,
    pub accounts: Accounts,
    pub uploads: Arc<UploadStore>,
    pub metrics: Arc<Metrics>,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let body_limit = state.uploads.body_limit();

    Router::new()
        .route("/upload", post(upload::upload))
        .route("/files", get(upload::list))
        .route("/files/{id}", get(upload::download))
        .route("/register", post(accounts::register))
        .route("/login", post(accounts::login))
        .route("/metrics", get(handle_metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admission::enforce,
        ))
        // Added after the admission layer so health checks are never counted
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}

/// Plaintext HTTP transport
///
/// Serves HTTP/1.1 and cleartext HTTP/2 on an already bound listener.
pub struct HttpTransport {
    listener: TcpListener,
    grace: Duration,
}

impl HttpTransport {
    pub fn new(listener: TcpListener, grace: Duration) -> Self {
        Self { listener, grace }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(self, app: Router, shutdown: CancellationToken) -> Result<()> {
        let HttpTransport { listener, grace } = self;

        tracing::info!("HTTP server listening on {}", listener.local_addr()?);

        serve(listener, app, shutdown, grace, |stream| {
            std::future::ready(Ok::<_, std::io::Error>(stream))
        })
        .await
    }
}
