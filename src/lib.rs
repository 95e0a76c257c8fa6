//! # frame-search
//!
//! Query orchestration for text-driven video keyframe retrieval. Natural
//! language queries (typically Vietnamese) are translated, embedded and
//! matched against a vector index of keyframes, then rescored for temporal
//! structure and result diversity.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────────┐
//!                 │ first query │ next query  │
//!                 └──────┬──────┴──────┬──────┘
//!                        ▼             ▼
//!               ┌──────────────────────────────┐
//!               │ Keyword Anchor Translation   │
//!               │ exact phrase │ MT + anchors  │
//!               └──────────────┬───────────────┘
//!                              ▼
//!               ┌──────────────────────────────┐
//!               │ Result Cache (memory + disk) │──── hit ───┐
//!               └──────────────┬───────────────┘            │
//!                              │ miss                       │
//!              ┌───────────────┴───────────────┐            │
//!              ▼                               ▼            │
//!     ┌─────────────────┐             ┌─────────────────┐   │
//!     │ encode + search │             │ encode + search │   │
//!     │   (first)       │             │   (next)        │   │
//!     └────────┬────────┘             └────────┬────────┘   │
//!              └───────────────┬───────────────┘            │
//!                              ▼                            │
//!               ┌──────────────────────────────┐            │
//!               │ Temporal Pair Scoring        │            │
//!               │ bonus = s·(W − Δ)/W, Δ ≤ W   │            │
//!               └──────────────┬───────────────┘            │
//!                              ▼                            │
//!               ┌──────────────────────────────┐            │
//!               │ Diversity Filter (optional)  │            │
//!               └──────────────┬───────────────┘            │
//!                              ▼                            │
//!               ┌──────────────────────────────┐            │
//!               │ Image Rerank (optional)      │            │
//!               └──────────────┬───────────────┘            │
//!                              ▼                            │
//!               ┌──────────────────────────────┐            │
//!               │ Format + cache write         │◄───────────┘
//!               └──────────────────────────────┘
//! ```
//!
//! Sequential queries replace the temporal stage with path building: one
//! search per step, chains grown greedily forward in time within each video.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for services, caches and scoring
//! - [`models`] - Shared types: `Candidate`, `FrameHit`, request/response bodies
//! - [`frames`] - Keyframe catalog: fps lookup, timestamps, KIS segments, neighbors
//! - [`translate`] - Keyword anchor translation engine and dictionary
//! - [`upstream`] - Embedding, vector index and translation service clients
//! - [`cache`] - Two-tier query result cache, query history log, translation and embedding memo tables
//! - [`search::temporal`] - Two-event temporal pair scoring
//! - [`search::sequential`] - Multi-step path building and scoring
//! - [`search::diversity`] - Per-video cap and frame-gap filtering with backfill
//! - [`search::rerank`] - Image-embedding rerank of the result head
//! - [`search::pipeline`] - `QueryService`, the orchestrator
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod frames;
pub mod models;
pub mod search;
pub mod state;
pub mod translate;
pub mod upstream;
