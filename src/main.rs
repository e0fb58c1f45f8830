// Main entry point - Dependency injection and server setup
use std::{net::SocketAddr, sync::Arc};

use archive_viewer::application::pipeline::ArchivePipeline;
use archive_viewer::application::request_builder::RequestBuilder;
use archive_viewer::infrastructure::archiver_client::HttpArchiveClient;
use archive_viewer::infrastructure::config::load_archiver_config;
use archive_viewer::presentation::app_state::AppState;
use archive_viewer::presentation::routes::router;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_archiver_config()?;

    // Infrastructure
    let client = Arc::new(HttpArchiveClient::new()?);
    let builder = RequestBuilder::new(
        &config.archive.base_url,
        config.archive.utc_offset()?,
        config.archive.do_not_chunk,
    );

    // Application
    let pipeline = ArchivePipeline::new(
        client,
        config.binning.resolver(),
        builder,
        config.fetch.batch_size,
        config.binning.default_operator()?,
        config.timeouts.tiers(),
    );

    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
        target_points: config.target_points.clone(),
        live: config.live.clone(),
    });

    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!(archive = %config.archive.base_url, "Starting archive-viewer on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router(state)).await?;

    Ok(())
}
