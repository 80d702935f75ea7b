//! Connection loop shared by both transports
//!
//! Every connection runs on its own task in a [`JoinSet`]. On shutdown the
//! listener is closed, open connections are asked to finish through
//! hyper-util's graceful watcher, and whatever is still running when the
//! grace period ends is aborted.

use anyhow::Result;
use axum::Router;
use axum::extract::ConnectInfo;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Accept on `listener` and serve `app` until `shutdown` is cancelled
///
/// `handshake` turns each accepted socket into the stream HTTP is spoken
/// over. It runs on the connection's task, never on the accept loop.
pub(crate) async fn serve<H, F, IO>(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
    handshake: H,
) -> Result<()>
where
    H: Fn(TcpStream) -> F + Clone + Send + 'static,
    F: Future<Output = io::Result<IO>> + Send + 'static,
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        // Typically EMFILE; back off instead of spinning
                        tracing::error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                };

                let handshake = handshake.clone();
                let app = app.clone();
                let watcher = graceful.watcher();

                connections.spawn(async move {
                    let stream = match handshake(stream).await {
                        Ok(stream) => stream,
                        Err(e) => {
                            tracing::debug!("Handshake with {} failed: {}", peer, e);
                            return;
                        }
                    };

                    let service = hyper::service::service_fn(
                        move |mut request: hyper::Request<Incoming>| {
                            request.extensions_mut().insert(ConnectInfo(peer));
                            app.clone().oneshot(request)
                        },
                    );

                    let builder = auto::Builder::new(TokioExecutor::new());
                    let connection =
                        builder.serve_connection_with_upgrades(TokioIo::new(stream), service);

                    if let Err(e) = watcher.watch(connection).await {
                        tracing::debug!("Connection error from {}: {}", peer, e);
                    }
                });
            }
        }
    }

    drop(listener);
    tracing::info!("Draining in-flight requests (up to {:?})", grace);

    let drained = tokio::time::timeout(grace, async {
        graceful.shutdown().await;
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        tracing::warn!("Grace period expired, dropping open connections");
        connections.abort_all();
    }

    Ok(())
}
