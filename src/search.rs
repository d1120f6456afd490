//! Search orchestrator: cache lookup -> embed-on-miss -> cache-write -> store search.
use crate::chunker::CodeChunk;
use crate::embedding::Embedder;
use crate::error::{GitCtxError, ValidationError};
use crate::store::{SearchHit, VectorStore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Runs a single query through the embed-cache-search pipeline.
///
/// Fails fast on an empty or whitespace-only query, before ever touching
/// the cache, the embedder, or the store.
pub async fn run_search(
    query: &str,
    limit: usize,
    head_only: bool,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
) -> Result<Vec<SearchHit>, GitCtxError> {
    if query.trim().is_empty() {
        return Err(ValidationError::EmptyQuery.into());
    }

    let model = embedder.model_name();
    let cache_key = query_cache_key(query, model);

    let vector = match store.get_query_embedding(&cache_key).await? {
        Some(vector) => {
            tracing::debug!(cache_key, "query embedding cache hit");
            vector
        }
        None => {
            tracing::debug!(cache_key, "query embedding cache miss, calling embedder");
            let vector = embed_query(embedder.as_ref(), query).await?;
            store
                .cache_query_embedding(&cache_key, query, &vector, model)
                .await?;
            vector
        }
    };

    store.search(&vector, limit, head_only).await
}

/// `SHA-256(query || model)`, hex-encoded.
fn query_cache_key(query: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher.update(model.as_bytes());
    format!("{:x}", hasher.finalize())
}

async fn embed_query(embedder: &dyn Embedder, query: &str) -> Result<Vec<f32>, GitCtxError> {
    let chunk = CodeChunk {
        content: query.to_string(),
        start_line: 1,
        end_line: 1,
        token_count: crate::chunker::count_tokens(query),
        metadata: HashMap::new(),
    };
    let mut embeddings = embedder.embed_chunks("query", std::slice::from_ref(&chunk)).await?;
    embeddings
        .pop()
        .map(|e| e.vector)
        .ok_or_else(|| GitCtxError::other("embedder returned no vector for query"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{IndexState, LocationsBySha, StoreStatistics};
    use async_trait::async_trait;

    #[test]
    fn cache_key_is_stable_and_model_sensitive() {
        let a = query_cache_key("hello world", "text-embedding-3-small");
        let b = query_cache_key("hello world", "text-embedding-3-small");
        let c = query_cache_key("hello world", "text-embedding-3-large");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    struct UnreachableEmbedder;

    #[async_trait]
    impl Embedder for UnreachableEmbedder {
        async fn embed_chunks(
            &self,
            _blob_sha: &str,
            _chunks: &[CodeChunk],
        ) -> Result<Vec<crate::embedding::Embedding>, GitCtxError> {
            panic!("embedder should not be called for an empty query");
        }
        fn estimate_cost(&self, _token_count: u64) -> f64 {
            0.0
        }
        fn model_name(&self) -> &str {
            "text-embedding-3-small"
        }
        fn dimensions(&self) -> usize {
            1536
        }
    }

    struct UnreachableStore;

    #[async_trait]
    impl VectorStore for UnreachableStore {
        async fn add_chunks_batch(
            &self,
            _embeddings: &[crate::embedding::Embedding],
            _locations: &LocationsBySha,
        ) -> Result<usize, GitCtxError> {
            unreachable!()
        }
        async fn refresh_locations(
            &self,
            _blob_sha: &str,
            _locations: &[crate::git::BlobLocation],
        ) -> Result<(), GitCtxError> {
            unreachable!()
        }
        async fn optimize(&self) -> Result<(), GitCtxError> {
            unreachable!()
        }
        async fn search(
            &self,
            _query_vector: &[f32],
            _limit: usize,
            _head_only: bool,
        ) -> Result<Vec<SearchHit>, GitCtxError> {
            unreachable!()
        }
        async fn get_query_embedding(&self, _cache_key: &str) -> Result<Option<Vec<f32>>, GitCtxError> {
            unreachable!()
        }
        async fn cache_query_embedding(
            &self,
            _cache_key: &str,
            _query_text: &str,
            _vector: &[f32],
            _model: &str,
        ) -> Result<(), GitCtxError> {
            unreachable!()
        }
        async fn load_index_state(&self) -> Result<IndexState, GitCtxError> {
            unreachable!()
        }
        async fn save_index_state(&self, _state: &IndexState) -> Result<(), GitCtxError> {
            unreachable!()
        }
        async fn count(&self) -> Result<usize, GitCtxError> {
            unreachable!()
        }
        async fn get_statistics(&self) -> Result<StoreStatistics, GitCtxError> {
            unreachable!()
        }
    }

    struct CountingEmbedder {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed_chunks(
            &self,
            _blob_sha: &str,
            chunks: &[CodeChunk],
        ) -> Result<Vec<crate::embedding::Embedding>, GitCtxError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(chunks
                .iter()
                .map(|c| crate::embedding::Embedding {
                    vector: vec![0.1, 0.2, 0.3],
                    token_count: c.token_count,
                    model: self.model_name().to_string(),
                    cost_usd: 0.0,
                    blob_sha: "query".to_string(),
                    chunk_index: 0,
                    chunk_content: c.content.clone(),
                    start_line: c.start_line,
                    end_line: c.end_line,
                    total_chunks: 1,
                    language: "text".to_string(),
                    api_token_count: None,
                })
                .collect())
        }
        fn estimate_cost(&self, _token_count: u64) -> f64 {
            0.0
        }
        fn model_name(&self) -> &str {
            "text-embedding-3-small"
        }
        fn dimensions(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn repeated_query_hits_the_cache_and_embeds_only_once() {
        let tmp = tempfile::tempdir().unwrap();
        let store: Arc<dyn VectorStore> = Arc::new(
            crate::store::LanceStore::open(&tmp.path().join("db"), 3)
                .await
                .unwrap(),
        );
        let embedder = Arc::new(CountingEmbedder {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });

        run_search("find the parser", 5, false, embedder.clone(), store.clone())
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        run_search("find the parser", 5, false, embedder.clone(), store.clone())
            .await
            .unwrap();
        assert_eq!(
            embedder.calls.load(std::sync::atomic::Ordering::SeqCst),
            1,
            "second identical query must be served from the query cache"
        );
    }

    #[tokio::test]
    async fn empty_query_fails_fast_without_touching_embedder_or_store() {
        let err = run_search(
            "   ",
            10,
            false,
            Arc::new(UnreachableEmbedder),
            Arc::new(UnreachableStore),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GitCtxError::Validation(ValidationError::EmptyQuery)));
    }
}
