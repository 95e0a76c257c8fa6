use axum::extract::State;
use axum::Json;

use crate::models::{NeighborRequest, NeighborResponse};
use crate::state::AppState;

/// POST /api/frames/neighbors - Keyframes surrounding a result in the same video
pub async fn neighbors(
    State(state): State<AppState>,
    Json(req): Json<NeighborRequest>,
) -> Json<NeighborResponse> {
    let neighbors = state.service.neighbors(&req).await;
    Json(NeighborResponse { neighbors })
}
