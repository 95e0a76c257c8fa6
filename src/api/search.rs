use axum::extract::State;
use axum::Json;

use crate::error::QueryError;
use crate::models::{SequentialQueryRequest, SequentialResponse, TextQueryRequest, TextQueryResponse};
use crate::state::AppState;

/// POST /api/search/text - Text search with an optional follow-up event:
///   1. Translate both queries (keyword anchors appended)
///   2. Cache lookup on the translated form
///   3. Encode + vector search, temporal pair scoring if a next query is given
///   4. Diversity filter and image rerank when enabled
pub async fn text_query(
    State(state): State<AppState>,
    Json(req): Json<TextQueryRequest>,
) -> Result<Json<TextQueryResponse>, QueryError> {
    let top_k = req.top_k.unwrap_or(state.config.diversity.max_results);
    let results = state
        .service
        .text_query(&req.first_query, &req.next_query, top_k)
        .await?;

    Ok(Json(TextQueryResponse {
        total_results: results.len(),
        results,
        first_query: req.first_query,
        next_query: req.next_query,
    }))
}

/// POST /api/search/sequential - Ordered multi-step event search
pub async fn sequential_query(
    State(state): State<AppState>,
    Json(req): Json<SequentialQueryRequest>,
) -> Result<Json<SequentialResponse>, QueryError> {
    let resp = state.service.sequential_query(&req).await?;
    Ok(Json(resp))
}
