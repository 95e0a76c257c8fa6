use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use frame_search::api;
use frame_search::config::Config;
use frame_search::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Keyframes directory: {}", config.keyframes_dir.display());
    tracing::info!(
        "Embedding service: {} ({})",
        config.embedding.base_url,
        config.embedding.model
    );
    tracing::info!(
        "Vector index: {} ({})",
        config.index.base_url,
        config.index.collection
    );

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/api/search/text", post(api::search::text_query))
        .route("/api/search/sequential", post(api::search::sequential_query))
        .route("/api/frames/neighbors", post(api::frames::neighbors))
        .route("/api/config", get(api::system::get_config))
        .route("/api/health", get(api::system::health))
        .route("/api/history", get(api::system::history))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
