use std::sync::Arc;

use clap::Parser;
use outpost::config::{Cli, RuntimeMode, Tool};
use outpost::{api, tools};
use outpost_backend::HttpBackend;
use outpost_lobby::LobbyManager;
use outpost_protocol::EventCatalog;
use outpost_transport::WsConnection;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = match cli.mode {
        RuntimeMode::Dev => "outpost=debug,info",
        RuntimeMode::Prod => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Some(Tool::ExportEvents { output }) = cli.tool {
        tools::export_event_specs(&output)?;
        tracing::info!(path = %output.display(), "event specs exported");
        return Ok(());
    }

    // An id clash in the catalog is a build defect; refuse to start.
    let catalog = EventCatalog::build()?;
    tracing::info!(events = catalog.len(), "event catalog loaded");

    let backend = Arc::new(HttpBackend::new(&cli.backend_host, cli.backend_port)?);
    let manager: Arc<LobbyManager<WsConnection, HttpBackend>> =
        LobbyManager::new(cli.encoding, backend);

    let app = api::router(Arc::clone(&manager));
    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, encoding = %cli.encoding, "outpost listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(manager))
        .await?;
    Ok(())
}

/// Resolves on SIGINT, closing every lobby before the server stops
/// accepting.
async fn shutdown_signal(manager: Arc<LobbyManager<WsConnection, HttpBackend>>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
    manager.shutdown().await;
}
