use tokio_util::sync::CancellationToken;

use ingest_engine::{IngestConfig, Pipeline};

use crate::error::ServerError;

pub async fn run(config_path: &str) -> Result<(), ServerError> {
    tracing::info!(config = %config_path, "ingest-server starting");

    // --- Load config ---
    let config = IngestConfig::load(config_path)?;

    // --- Open connectors ---
    let pipeline = Pipeline::bootstrap(&config).await?;

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutting down..."),
            Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
        }
        signal_token.cancel();
    });

    tracing::info!("pipeline running, press Ctrl+C to stop");
    let stats = pipeline.run(token).await?;

    tracing::info!(
        received = stats.received,
        delivered = stats.delivered,
        skipped = stats.skipped,
        dead_lettered = stats.dead_lettered,
        "ingest-server stopped"
    );
    Ok(())
}
