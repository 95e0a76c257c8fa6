use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::IndexConfig;
use crate::frames::FrameCatalog;
use crate::models::Candidate;

/// Attributes requested for every hit.
const OUTPUT_FIELDS: [&str; 3] = ["keyframe_path", "frame_id", "video"];

/// Raw nearest-neighbor hit before it is turned into a [`Candidate`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    /// Cosine similarity, higher is better
    pub score: f32,
    pub attributes: Map<String, Value>,
}

/// Approximate nearest-neighbor search over keyframe vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(&self, vector: &[f32], limit: usize, filter: Option<&str>)
        -> Result<Vec<IndexHit>>;
}

/// Turn index hits into candidates, skipping hits without a usable
/// keyframe path or frame id.
pub fn into_candidates(hits: Vec<IndexHit>, catalog: &FrameCatalog) -> Vec<Candidate> {
    let mut skipped = 0usize;
    let candidates: Vec<Candidate> = hits
        .into_iter()
        .filter_map(|hit| {
            let keyframe_path = hit.attributes.get("keyframe_path").and_then(Value::as_str);
            let frame_id = hit.attributes.get("frame_id").and_then(as_frame_id);
            let (Some(keyframe_path), Some(frame_id)) = (keyframe_path, frame_id) else {
                skipped += 1;
                return None;
            };
            let video = hit
                .attributes
                .get("video")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(catalog.candidate(hit.id.clone(), hit.score, video, frame_id, keyframe_path))
        })
        .collect();

    if skipped > 0 {
        tracing::warn!("Skipped {skipped} index hits with missing attributes");
    }
    candidates
}

fn as_frame_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ─── Milvus v2 REST ──────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    collection_name: &'a str,
    db_name: &'a str,
    data: Vec<&'a [f32]>,
    anns_field: &'a str,
    limit: usize,
    output_fields: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
    search_params: SearchParams,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    metric_type: &'static str,
    params: Value,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<Map<String, Value>>,
}

pub struct MilvusClient {
    client: reqwest::Client,
    config: IndexConfig,
}

impl MilvusClient {
    pub fn new(client: reqwest::Client, config: IndexConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl VectorIndex for MilvusClient {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<IndexHit>> {
        let url = format!(
            "{}/v2/vectordb/entities/search",
            self.config.base_url.trim_end_matches('/')
        );
        let req = SearchRequest {
            collection_name: &self.config.collection,
            db_name: &self.config.database,
            data: vec![vector],
            anns_field: &self.config.vector_field,
            limit,
            output_fields: &OUTPUT_FIELDS,
            filter,
            search_params: SearchParams {
                metric_type: "COSINE",
                params: serde_json::json!({ "nprobe": 64 }),
            },
        };

        let mut builder = self.client.post(&url).json(&req);
        if let Some(token) = &self.config.token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        let resp = builder
            .send()
            .await
            .context("Failed to call Milvus search API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Milvus search API returned {status}: {body}");
        }

        let body: SearchResponse = resp
            .json()
            .await
            .context("Failed to parse Milvus search response")?;

        if body.code != 0 {
            anyhow::bail!(
                "Milvus search failed with code {}: {}",
                body.code,
                body.message.unwrap_or_default()
            );
        }

        Ok(body.data.into_iter().map(parse_hit).collect())
    }
}

/// Split a Milvus row into id, score and the remaining output fields.
/// With the COSINE metric the `distance` field carries the similarity.
fn parse_hit(mut row: Map<String, Value>) -> IndexHit {
    let id = match row.remove("id") {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let score = row
        .remove("distance")
        .and_then(|d| d.as_f64())
        .unwrap_or(0.0) as f32;
    IndexHit {
        id,
        score,
        attributes: row,
    }
}
