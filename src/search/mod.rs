//! Retrieval scoring stages and the orchestrator that chains them.

pub mod diversity;
pub mod pipeline;
pub mod rerank;
pub mod sequential;
pub mod temporal;
