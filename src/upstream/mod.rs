//! Clients for the external services the query pipeline depends on.
//!
//! Each service sits behind a trait so the pipeline can be driven by
//! in-memory fakes in tests.

pub mod embeddings;
pub mod index;
pub mod translate;
