//! Caller-facing error for the query pipeline.
//!
//! An empty result list is not an error; only rejected input and failed
//! upstream calls surface here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    /// The request cannot be answered as written
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Embedding or index call failed; no result is producible without them
    #[error("Upstream service failed: {0}")]
    Upstream(#[from] anyhow::Error),
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        match self {
            QueryError::InvalidQuery(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            QueryError::Upstream(e) => {
                tracing::error!("Query failed: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }
        }
    }
}
