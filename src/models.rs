use serde::{Deserialize, Serialize};

/// A retrieved keyframe with its match score.
///
/// Built once at the vector-index boundary; downstream stages only read it,
/// apart from rerank and temporal scoring which overwrite `score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    /// Similarity to the query, higher is better
    pub score: f32,
    pub video: String,
    /// Frame index within `video`; defines temporal order
    pub frame_id: i64,
    pub keyframe_path: String,
    pub fps: f64,
    pub time_seconds: f64,
}

impl Candidate {
    /// Cosine distance implied by the similarity score.
    pub fn distance(&self) -> f32 {
        1.0 - self.score
    }
}

/// Allowed time between two consecutive steps of a sequential query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeGap {
    #[serde(default, alias = "min")]
    pub min_seconds: f64,
    /// No upper bound when absent
    #[serde(default, alias = "max")]
    pub max_seconds: Option<f64>,
}

/// Known-item-search submission window around a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KisSegment {
    pub start_ms: i64,
    pub end_ms: i64,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub start_frame: f64,
    pub end_frame: f64,
}

/// A candidate formatted for the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHit {
    pub id: String,
    pub score: f32,
    pub video: String,
    pub frame_id: i64,
    pub keyframe_path: String,
    pub thumbnail_path: String,
    pub video_path: String,
    pub fps: f64,
    pub time_seconds: f64,
    /// `HH:MM:SS.mmm`
    pub time: String,
    pub kis_segment: KisSegment,
}

/// One scored sequential chain, keyed by its step-0 frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialHit {
    #[serde(flatten)]
    pub frame: FrameHit,
    pub matched_steps: Vec<usize>,
    /// Matched frame id for each entry of `matched_steps`
    pub step_frames: Vec<i64>,
    pub completeness: f32,
    pub coherence: f32,
    pub similarity: f32,
    pub sequential_score: f32,
}

/// Text (optionally two-event temporal) search request
#[derive(Debug, Clone, Deserialize)]
pub struct TextQueryRequest {
    #[serde(alias = "First_query")]
    pub first_query: String,
    #[serde(default, alias = "Next_query")]
    pub next_query: String,
    /// Falls back to the configured diversity result size when absent
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextQueryResponse {
    pub results: Vec<FrameHit>,
    pub first_query: String,
    pub next_query: String,
    pub total_results: usize,
}

/// N-step "a, then b, then c" search request
#[derive(Debug, Clone, Deserialize)]
pub struct SequentialQueryRequest {
    pub queries: Vec<String>,
    #[serde(default = "default_sequential_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub require_all_steps: bool,
    /// Entry `i` constrains the transition from step `i` to step `i + 1`
    #[serde(default)]
    pub time_gap_constraints: Option<Vec<Option<TimeGap>>>,
}

fn default_sequential_top_k() -> usize {
    50
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialResponse {
    pub results: Vec<SequentialHit>,
    pub total_results: usize,
    pub num_steps: usize,
    /// Translated step queries
    pub queries: Vec<String>,
    pub execution_time: f64,
}

/// Temporal neighbors request
#[derive(Debug, Clone, Deserialize)]
pub struct NeighborRequest {
    pub video: String,
    pub frame_id: i64,
    #[serde(default = "default_neighbor_count")]
    pub count: usize,
    #[serde(default = "default_neighbor_stride")]
    pub stride: i64,
    #[serde(default)]
    pub keyframe_path: String,
}

fn default_neighbor_count() -> usize {
    3
}

fn default_neighbor_stride() -> i64 {
    25
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborFrame {
    pub keyframe_path: String,
    pub thumbnail_path: String,
    pub frame_id: i64,
    pub video: String,
    pub time: String,
    pub time_seconds: f64,
    pub video_path: String,
    /// Signed distance in frames from the requested frame
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighborResponse {
    pub neighbors: Vec<NeighborFrame>,
}

/// What produced a cached payload; stored next to it and in the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryInfo {
    TextTemporal {
        first_query: String,
        first_query_en: String,
        second_query: String,
        second_query_en: String,
        top_k: usize,
    },
    Sequential {
        queries: Vec<String>,
        queries_en: Vec<String>,
        top_k: usize,
        require_all_steps: bool,
        #[serde(default)]
        time_gap_constraints: Vec<Option<TimeGap>>,
    },
}

/// Result payload held by the query cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum QueryPayload {
    Frames(Vec<FrameHit>),
    Sequential(SequentialResponse),
}
