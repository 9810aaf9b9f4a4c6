use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use clap::Parser;
use image::RgbImage;
use sam_embed_server::{
    preprocess::TARGET_LENGTH, router, AppState, Config, ImageEncoder, OnnxImageEncoder,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    info!(?config, "starting");

    let encoder = OnnxImageEncoder::load(&config.model, config.device, config.intra_threads())
        .with_context(|| format!("failed to load encoder {}", config.model.display()))?;

    if config.warmup {
        let blank = RgbImage::new(TARGET_LENGTH, TARGET_LENGTH);
        let embedding = encoder.embed(&blank).context("warm-up inference failed")?;
        info!(shape = ?embedding.shape(), "warm-up complete");
    }

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = router(AppState::new(Arc::new(encoder)), config.max_body_bytes)
        .route("/metrics", get(move || async move { metric_handle.render() }))
        .layer(prometheus_layer);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
