use reelhub_infra::config::AppConfig;
use reelhub_infra::logging::init_tracing;
use reelhub_infra::observability::{init_metrics, render_metrics};
use reelhub_server::AppState;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config)?;
    init_metrics()?;

    let state = AppState::new(config).await?;
    match state.db.health_check().await {
        Ok(()) => info!(
            backend = state.db.name(),
            endpoint = %state.db.endpoint(),
            "store reachable"
        ),
        Err(err) => warn!(backend = state.db.name(), error = %err, "store health check failed"),
    }

    info!(
        backend = state.db.name(),
        execution_mode = %state.execution_mode(),
        related_videos_count = state.config.related_videos_count,
        related_fanout_width = state.related.fanout_width(),
        "reelhub server ready"
    );
    shutdown_signal().await;

    if let Some(snapshot) = render_metrics() {
        debug!(metrics = %snapshot, "final metrics snapshot");
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
