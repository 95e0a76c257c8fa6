use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::cache::history::HistoryRecord;
use crate::state::AppState;

/// Config response with credentials redacted
#[derive(Serialize)]
pub struct ConfigResponse {
    pub embedding_url: String,
    pub embedding_model: String,
    pub index_url: String,
    pub collection: String,
    pub translation_url: Option<String>,
    pub has_index_token: bool,
    pub cache_ttl_secs: u64,
    pub diversity_enabled: bool,
    pub diversity_max_per_video: usize,
    pub diversity_max_results: usize,
    pub rerank_enabled: bool,
    pub temporal_window_frames: i64,
}

/// GET /api/config
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let config = &state.config;
    Json(ConfigResponse {
        embedding_url: config.embedding.base_url.clone(),
        embedding_model: config.embedding.model.clone(),
        index_url: config.index.base_url.clone(),
        collection: config.index.collection.clone(),
        translation_url: config.translation.base_url.clone(),
        has_index_token: config.index.token.is_some(),
        cache_ttl_secs: config.cache.ttl_secs,
        diversity_enabled: config.diversity.enabled,
        diversity_max_per_video: config.diversity.max_per_video,
        diversity_max_results: config.diversity.max_results,
        rerank_enabled: config.rerank.enabled,
        temporal_window_frames: config.temporal_window_frames,
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cache_entries: usize,
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        cache_entries: state.service.cache_len(),
    })
}

#[derive(Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

/// GET /api/history?limit=N - Most recent queries first
pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<HistoryRecord>> {
    Json(state.service.history(params.limit))
}
