//! Shutdown signal handling
//!
//! SIGTERM and SIGINT both start a graceful shutdown. A signal that cannot
//! be registered is logged and simply never fires; the other one still
//! works.

use tracing::{info, warn};

/// Resolves once the process has been asked to stop
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::SignalKind;

    tokio::select! {
        _ = wait_for(SignalKind::terminate(), "SIGTERM") => {}
        _ = wait_for(SignalKind::interrupt(), "SIGINT") => {}
    }
}

#[cfg(unix)]
async fn wait_for(kind: tokio::signal::unix::SignalKind, name: &str) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
            info!("Received {}, initiating graceful shutdown", name);
        }
        Err(e) => {
            warn!("Failed to register {} handler: {}", name, e);
            std::future::pending::<()>().await;
        }
    }
}

/// Resolves once the process has been asked to stop
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(e) => {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
