use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use vortexbox_server::Server;
use vortexbox_server::config::Config;
use vortexbox_server::shutdown::shutdown_signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("vortexbox={}", config.log_level).parse()?),
        )
        .init();

    if !config.transport.is_tls() {
        tracing::warn!(
            "No --ssl-public-key/--ssl-private-key given, serving plaintext HTTP; \
             credentials and payloads travel unencrypted"
        );
    }

    let server = Server::new(config)?;

    let (host, port) = (
        server.config().transport.host.clone(),
        server.config().transport.port,
    );
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;

    let config = server.config();
    tracing::info!(
        "VortexBox server started: store {:?}, limit {} per {:?}, failure policy {:?}",
        config.store.backend,
        config.admission.limit,
        config.admission.period,
        config.admission.failure_policy
    );
    tracing::info!(
        "Uploads in {} (max {} bytes), shutdown grace {:?}",
        config.upload.dir.display(),
        config.upload.max_bytes,
        config.shutdown_grace
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal.cancel();
    });

    server.run(listener, shutdown).await?;

    tracing::info!("VortexBox server stopped");
    Ok(())
}
