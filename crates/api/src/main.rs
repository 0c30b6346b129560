use std::sync::Arc;

use anyhow::Context;

use stocklink_api::app::{AppState, build_app};
use stocklink_api::config::ServerConfig;
use stocklink_infra::platform::InMemoryPlatform;
use stocklink_infra::{SyncConfig, SyncServices};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stocklink_observability::init();

    let server = ServerConfig::from_env();
    let sync = SyncConfig::from_env();

    // Platform adapters implement `CommercePlatform`; the in-memory one serves dev.
    let platform = Arc::new(InMemoryPlatform::new());
    let services = SyncServices::connect(sync, platform)
        .await
        .context("failed to initialise sync services")?;

    let app = build_app(AppState::new(services.clone(), &server));

    let listener = tokio::net::TcpListener::bind(&server.bind)
        .await
        .with_context(|| format!("failed to bind {}", server.bind))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server error")?;

    services.shutdown().await;
    Ok(())
}
