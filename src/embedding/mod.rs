//! Embedding generation over remote, OpenAI-compatible HTTP providers.
mod openai;

pub use openai::OpenAiCompatibleEmbedder;

use crate::chunker::CodeChunk;
use crate::error::GitCtxError;
use async_trait::async_trait;

/// Immutable result of embedding one chunk.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub token_count: usize,
    pub model: String,
    pub cost_usd: f64,
    pub blob_sha: String,
    pub chunk_index: usize,
    pub chunk_content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub total_chunks: usize,
    pub language: String,
    pub api_token_count: Option<usize>,
}

/// Async embedding provider. Implementations own their own batching,
/// retry, and cost-accounting policy; callers only see a flat list of
/// embeddings back, one per input chunk, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `chunks` (each tagged with its owning blob's SHA), returning
    /// one [`Embedding`] per chunk in the same order.
    async fn embed_chunks(
        &self,
        blob_sha: &str,
        chunks: &[CodeChunk],
    ) -> Result<Vec<Embedding>, GitCtxError>;

    /// Estimate the USD cost of embedding `token_count` tokens without
    /// making a network call.
    fn estimate_cost(&self, token_count: u64) -> f64;

    fn model_name(&self) -> &str;
    fn dimensions(&self) -> usize;
}
