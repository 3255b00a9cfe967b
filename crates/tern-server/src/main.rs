use tokio_util::sync::CancellationToken;
use tracing::info;

use tern_server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tern_server=debug,tern_protocol=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    info!(
        "Timeout {}s, {} retries, janitor every {}s",
        config.session.timeout.as_secs(),
        config.session.max_retries,
        config.janitor_interval.as_secs()
    );

    let cancel = CancellationToken::new();
    let server = Server::bind(&config, cancel.clone())?;
    info!("Tern server listening on {}", server.local_addr());

    // The accept loop and workers are blocking; keep them off the runtime.
    let mut serving = tokio::task::spawn_blocking(move || server.run());

    tokio::select! {
        _ = shutdown_signal() => cancel.cancel(),
        result = &mut serving => return result?,
    }

    serving.await?
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
