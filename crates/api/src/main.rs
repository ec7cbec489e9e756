use std::sync::Arc;

use anyhow::Context;

use partsmarket_infra::{LogNotifier, MarketplaceConfig, NotificationWorker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    partsmarket_observability::init();

    let config = MarketplaceConfig::from_env();
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set; admin routes are disabled");
    }

    let services = Arc::new(partsmarket_api::app::services::build_services(&config).await?);

    let notifier = NotificationWorker::spawn(&services.bus, Arc::new(LogNotifier))
        .context("failed to start the notification worker")?;
    let expiry = services.spawn_expiry_scheduler(&config);
    tracing::debug!(subscribers = services.bus.subscriber_count(), "background workers started");

    let app = partsmarket_api::app::build_router(services.clone(), config.admin_token.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, backend = services.backend.as_str(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    expiry.shutdown().await;
    notifier.shutdown();
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
    }
}
