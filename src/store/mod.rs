//! Denormalized vector store: one row per (chunk, location) pair.
pub mod lance;

pub use lance::LanceStore;

use crate::embedding::Embedding;
use crate::error::GitCtxError;
use crate::git::BlobLocation;
use async_trait::async_trait;
use std::collections::HashMap;

/// On-disk row: an `Embedding`'s fields plus one flattened `BlobLocation`.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub blob_sha: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub chunk_content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub token_count: usize,
    pub model: String,
    pub location: BlobLocation,
}

/// A search result surfaced to formatters: a stored row plus its distance.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: ChunkRecord,
    pub distance: f32,
}

/// `{last_commit, indexed_blob_shas, embedding_model, timestamp}`, written
/// atomically after a successful index run.
#[derive(Debug, Clone, Default)]
pub struct IndexState {
    pub last_commit: Option<String>,
    pub indexed_blob_shas: Vec<String>,
    pub embedding_model: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default)]
pub struct StoreStatistics {
    pub total_chunks: usize,
    pub total_files: usize,
    pub total_blobs: usize,
    pub total_commits: usize,
    pub model: Option<String>,
}

/// `blob_sha -> its locations`, the shape `add_chunks_batch` consumes so a
/// skipped (already-indexed) blob can still have its location rows
/// refreshed without re-embedding.
pub type LocationsBySha = HashMap<String, Vec<BlobLocation>>;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts one row per `(embedding, location)` pair. `locations` supplies
    /// the full location set for every blob touched in this call, including
    /// blobs present only because their locations need refreshing (no
    /// matching `embeddings` entries for those).
    async fn add_chunks_batch(
        &self,
        embeddings: &[Embedding],
        locations: &LocationsBySha,
    ) -> Result<usize, GitCtxError>;

    /// Refreshes location rows for an already-embedded blob without
    /// touching its vectors, recomputing `is_head`.
    async fn refresh_locations(
        &self,
        blob_sha: &str,
        locations: &[BlobLocation],
    ) -> Result<(), GitCtxError>;

    /// Builds or refreshes the ANN index. A no-op below the configured row
    /// threshold.
    async fn optimize(&self) -> Result<(), GitCtxError>;

    async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        head_only: bool,
    ) -> Result<Vec<SearchHit>, GitCtxError>;

    async fn get_query_embedding(&self, cache_key: &str) -> Result<Option<Vec<f32>>, GitCtxError>;

    async fn cache_query_embedding(
        &self,
        cache_key: &str,
        query_text: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<(), GitCtxError>;

    async fn load_index_state(&self) -> Result<IndexState, GitCtxError>;

    async fn save_index_state(&self, state: &IndexState) -> Result<(), GitCtxError>;

    async fn count(&self) -> Result<usize, GitCtxError>;

    async fn get_statistics(&self) -> Result<StoreStatistics, GitCtxError>;
}
