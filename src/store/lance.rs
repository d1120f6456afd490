//! LanceDB-backed [`VectorStore`].
use super::{ChunkRecord, IndexState, LocationsBySha, SearchHit, StoreStatistics, VectorStore};
use crate::embedding::Embedding;
use crate::error::{GitCtxError, StorageError};
use crate::git::BlobLocation;
use arrow_array::{
    Array, BooleanArray, FixedSizeListArray, Float32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray, UInt32Array, types::Float32Type,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use fs2::FileExt;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CHUNKS_TABLE: &str = "chunks";
const QUERY_CACHE_TABLE: &str = "query_cache";
const INDEX_STATE_TABLE: &str = "index_state";

/// Row count below which [`LanceStore::optimize`] is a no-op; a flat scan
/// is cheaper than building an ANN index for small tables.
const DEFAULT_ANN_THRESHOLD: usize = 256;

pub struct LanceStore {
    connection: Connection,
    db_path: PathBuf,
    dimensions: usize,
    ann_threshold: usize,
}

impl LanceStore {
    pub async fn open(db_path: &Path, dimensions: usize) -> Result<Self, GitCtxError> {
        std::fs::create_dir_all(db_path)?;
        let connection = lancedb::connect(&db_path.to_string_lossy())
            .execute()
            .await
            .map_err(|e| StorageError::OpenFailed {
                path: db_path.display().to_string(),
                reason: e.to_string(),
            })?;
        let store = Self {
            connection,
            db_path: db_path.to_path_buf(),
            dimensions,
            ann_threshold: DEFAULT_ANN_THRESHOLD,
        };
        store.ensure_tables().await?;
        Ok(store)
    }

    pub fn with_ann_threshold(mut self, threshold: usize) -> Self {
        self.ann_threshold = threshold;
        self
    }

    fn chunks_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimensions as i32,
                ),
                false,
            ),
            Field::new("blob_sha", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("total_chunks", DataType::UInt32, false),
            Field::new("chunk_content", DataType::Utf8, false),
            Field::new("start_line", DataType::UInt32, false),
            Field::new("end_line", DataType::UInt32, false),
            Field::new("language", DataType::Utf8, false),
            Field::new("token_count", DataType::UInt32, false),
            Field::new("model", DataType::Utf8, false),
            Field::new("file_path", DataType::Utf8, false),
            Field::new("commit_sha", DataType::Utf8, false),
            Field::new("author_name", DataType::Utf8, false),
            Field::new("author_email", DataType::Utf8, false),
            Field::new("commit_date", DataType::Int64, false),
            Field::new("commit_message", DataType::Utf8, false),
            Field::new("is_head", DataType::Boolean, false),
            Field::new("is_merge", DataType::Boolean, false),
        ]))
    }

    fn query_cache_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("cache_key", DataType::Utf8, false),
            Field::new("query_text", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimensions as i32,
                ),
                false,
            ),
            Field::new("model", DataType::Utf8, false),
            Field::new("timestamp", DataType::Int64, false),
        ]))
    }

    fn index_state_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::UInt32, false),
            Field::new("last_commit", DataType::Utf8, true),
            Field::new("indexed_blob_shas", DataType::Utf8, false),
            Field::new("embedding_model", DataType::Utf8, true),
            Field::new("timestamp", DataType::Int64, false),
        ]))
    }

    async fn ensure_tables(&self) -> Result<(), GitCtxError> {
        let existing = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| StorageError::OpenFailed {
                path: self.db_path.display().to_string(),
                reason: e.to_string(),
            })?;

        if !existing.contains(&CHUNKS_TABLE.to_string()) {
            self.create_empty(CHUNKS_TABLE, self.chunks_schema()).await?;
        }
        if !existing.contains(&QUERY_CACHE_TABLE.to_string()) {
            self.create_empty(QUERY_CACHE_TABLE, self.query_cache_schema())
                .await?;
        }
        if !existing.contains(&INDEX_STATE_TABLE.to_string()) {
            self.create_empty(INDEX_STATE_TABLE, Self::index_state_schema())
                .await?;
        }
        Ok(())
    }

    async fn create_empty(&self, name: &str, schema: Arc<Schema>) -> Result<(), GitCtxError> {
        let empty = RecordBatch::new_empty(schema.clone());
        let batches = RecordBatchIterator::new(vec![Ok(empty)], schema);
        self.connection
            .create_table(name, Box::new(batches))
            .execute()
            .await
            .map_err(|e| StorageError::OpenFailed {
                path: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn table(&self, name: &str) -> Result<Table, GitCtxError> {
        self.connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| {
                StorageError::OpenFailed {
                    path: name.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    /// Acquires an exclusive cross-process file lock for the duration of a
    /// write, released when the returned guard drops.
    fn lock_for_write(&self) -> Result<WriteLockGuard, GitCtxError> {
        let lock_path = self.db_path.join(".write.lock");
        let file = File::create(&lock_path)?;
        file.lock_exclusive().map_err(|e| StorageError::LockFailed {
            path: lock_path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(WriteLockGuard { _file: file })
    }

    /// Reads every row currently stored for `blob_sha` and collapses them to
    /// one [`ChunkRecord`] per `chunk_index`, keeping the vector and
    /// chunk-level fields (the per-location fields are discarded; the caller
    /// supplies fresh ones). Used by `refresh_locations` to preserve a
    /// blob's embeddings across a locations-only update.
    async fn read_chunks_for_blob(&self, blob_sha: &str) -> Result<Vec<ChunkRecord>, GitCtxError> {
        let table = self.table(CHUNKS_TABLE).await?;
        let filter = format!("blob_sha = '{blob_sha}'");
        let stream = table
            .query()
            .only_if(filter)
            .execute()
            .await
            .map_err(|e| StorageError::SearchFailed {
                table: CHUNKS_TABLE.to_string(),
                reason: e.to_string(),
            })?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| StorageError::SearchFailed {
                table: CHUNKS_TABLE.to_string(),
                reason: e.to_string(),
            })?;

        let mut by_chunk_index: HashMap<usize, ChunkRecord> = HashMap::new();
        for batch in &batches {
            let vector_array = batch
                .column_by_name("vector")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| StorageError::SchemaMismatch("vector column".to_string()))?;
            let blob_sha_array = column::<StringArray>(batch, "blob_sha")?;
            let chunk_index_array = column::<UInt32Array>(batch, "chunk_index")?;
            let total_chunks_array = column::<UInt32Array>(batch, "total_chunks")?;
            let chunk_content_array = column::<StringArray>(batch, "chunk_content")?;
            let start_line_array = column::<UInt32Array>(batch, "start_line")?;
            let end_line_array = column::<UInt32Array>(batch, "end_line")?;
            let language_array = column::<StringArray>(batch, "language")?;
            let token_count_array = column::<UInt32Array>(batch, "token_count")?;
            let model_array = column::<StringArray>(batch, "model")?;

            for i in 0..batch.num_rows() {
                let chunk_index = chunk_index_array.value(i) as usize;
                by_chunk_index.entry(chunk_index).or_insert_with(|| {
                    let vector = vector_array
                        .value(i)
                        .as_any()
                        .downcast_ref::<Float32Array>()
                        .map(|a| a.values().to_vec())
                        .unwrap_or_default();
                    ChunkRecord {
                        id: String::new(),
                        vector,
                        blob_sha: blob_sha_array.value(i).to_string(),
                        chunk_index,
                        total_chunks: total_chunks_array.value(i) as usize,
                        chunk_content: chunk_content_array.value(i).to_string(),
                        start_line: start_line_array.value(i) as usize,
                        end_line: end_line_array.value(i) as usize,
                        language: language_array.value(i).to_string(),
                        token_count: token_count_array.value(i) as usize,
                        model: model_array.value(i).to_string(),
                        location: BlobLocation {
                            blob_sha: blob_sha_array.value(i).to_string(),
                            file_path: String::new(),
                            commit_sha: String::new(),
                            author_name: String::new(),
                            author_email: String::new(),
                            commit_date: 0,
                            commit_message: String::new(),
                            is_head: false,
                            is_merge: false,
                        },
                    }
                });
            }
        }

        let mut rows: Vec<ChunkRecord> = by_chunk_index.into_values().collect();
        rows.sort_by_key(|r| r.chunk_index);
        Ok(rows)
    }

    fn build_chunk_batch(&self, rows: &[ChunkRecord]) -> Result<RecordBatch, GitCtxError> {
        let schema = self.chunks_schema();
        let dim = self.dimensions as i32;

        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            rows.iter()
                .map(|r| Some(r.vector.iter().copied().map(Some).collect::<Vec<_>>())),
            dim,
        );

        macro_rules! utf8 {
            ($f:ident) => {
                StringArray::from(rows.iter().map(|r| r.$f.as_str()).collect::<Vec<_>>())
            };
        }
        macro_rules! loc_utf8 {
            ($f:ident) => {
                StringArray::from(rows.iter().map(|r| r.location.$f.as_str()).collect::<Vec<_>>())
            };
        }

        let id_array = utf8!(id);
        let blob_sha_array = utf8!(blob_sha);
        let chunk_index_array =
            UInt32Array::from(rows.iter().map(|r| r.chunk_index as u32).collect::<Vec<_>>());
        let total_chunks_array =
            UInt32Array::from(rows.iter().map(|r| r.total_chunks as u32).collect::<Vec<_>>());
        let chunk_content_array = utf8!(chunk_content);
        let start_line_array =
            UInt32Array::from(rows.iter().map(|r| r.start_line as u32).collect::<Vec<_>>());
        let end_line_array =
            UInt32Array::from(rows.iter().map(|r| r.end_line as u32).collect::<Vec<_>>());
        let language_array = utf8!(language);
        let token_count_array =
            UInt32Array::from(rows.iter().map(|r| r.token_count as u32).collect::<Vec<_>>());
        let model_array = utf8!(model);
        let file_path_array = loc_utf8!(file_path);
        let commit_sha_array = loc_utf8!(commit_sha);
        let author_name_array = loc_utf8!(author_name);
        let author_email_array = loc_utf8!(author_email);
        let commit_date_array =
            Int64Array::from(rows.iter().map(|r| r.location.commit_date).collect::<Vec<_>>());
        let commit_message_array = loc_utf8!(commit_message);
        let is_head_array =
            BooleanArray::from(rows.iter().map(|r| r.location.is_head).collect::<Vec<_>>());
        let is_merge_array =
            BooleanArray::from(rows.iter().map(|r| r.location.is_merge).collect::<Vec<_>>());

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(id_array),
                Arc::new(vector_array),
                Arc::new(blob_sha_array),
                Arc::new(chunk_index_array),
                Arc::new(total_chunks_array),
                Arc::new(chunk_content_array),
                Arc::new(start_line_array),
                Arc::new(end_line_array),
                Arc::new(language_array),
                Arc::new(token_count_array),
                Arc::new(model_array),
                Arc::new(file_path_array),
                Arc::new(commit_sha_array),
                Arc::new(author_name_array),
                Arc::new(author_email_array),
                Arc::new(commit_date_array),
                Arc::new(commit_message_array),
                Arc::new(is_head_array),
                Arc::new(is_merge_array),
            ],
        )
        .map_err(|e| {
            StorageError::WriteFailed {
                table: CHUNKS_TABLE.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

struct WriteLockGuard {
    _file: File,
}

fn rows_from_embeddings(embeddings: &[Embedding], locations: &LocationsBySha) -> Vec<ChunkRecord> {
    let mut rows = Vec::new();
    for embedding in embeddings {
        let Some(locs) = locations.get(&embedding.blob_sha) else {
            continue;
        };
        for (location_index, location) in locs.iter().enumerate() {
            rows.push(ChunkRecord {
                id: format!(
                    "{}:{}:{}",
                    embedding.blob_sha, embedding.chunk_index, location_index
                ),
                vector: embedding.vector.clone(),
                blob_sha: embedding.blob_sha.clone(),
                chunk_index: embedding.chunk_index,
                total_chunks: embedding.total_chunks,
                chunk_content: embedding.chunk_content.clone(),
                start_line: embedding.start_line,
                end_line: embedding.end_line,
                language: embedding.language.clone(),
                token_count: embedding.token_count,
                model: embedding.model.clone(),
                location: location.clone(),
            });
        }
    }
    rows
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn add_chunks_batch(
        &self,
        embeddings: &[Embedding],
        locations: &LocationsBySha,
    ) -> Result<usize, GitCtxError> {
        let rows = rows_from_embeddings(embeddings, locations);
        if rows.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock_for_write()?;

        let batch = self.build_chunk_batch(&rows)?;
        let count = batch.num_rows();
        let schema = self.chunks_schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        let table = self.table(CHUNKS_TABLE).await?;
        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| StorageError::WriteFailed {
                table: CHUNKS_TABLE.to_string(),
                reason: e.to_string(),
            })?;
        Ok(count)
    }

    async fn refresh_locations(
        &self,
        blob_sha: &str,
        locations: &[BlobLocation],
    ) -> Result<(), GitCtxError> {
        let existing = self.read_chunks_for_blob(blob_sha).await?;
        if existing.is_empty() {
            tracing::warn!(blob_sha, "refresh_locations called for a blob with no stored chunks");
            return Ok(());
        }

        let mut rows = Vec::with_capacity(existing.len() * locations.len());
        for chunk in &existing {
            for (location_index, location) in locations.iter().enumerate() {
                rows.push(ChunkRecord {
                    id: format!("{blob_sha}:{}:{location_index}", chunk.chunk_index),
                    vector: chunk.vector.clone(),
                    blob_sha: blob_sha.to_string(),
                    chunk_index: chunk.chunk_index,
                    total_chunks: chunk.total_chunks,
                    chunk_content: chunk.chunk_content.clone(),
                    start_line: chunk.start_line,
                    end_line: chunk.end_line,
                    language: chunk.language.clone(),
                    token_count: chunk.token_count,
                    model: chunk.model.clone(),
                    location: location.clone(),
                });
            }
        }

        let _guard = self.lock_for_write()?;
        let table = self.table(CHUNKS_TABLE).await?;
        let filter = format!("blob_sha = '{blob_sha}'");
        table
            .delete(&filter)
            .await
            .map_err(|e| StorageError::WriteFailed {
                table: CHUNKS_TABLE.to_string(),
                reason: e.to_string(),
            })?;

        let batch = self.build_chunk_batch(&rows)?;
        let schema = self.chunks_schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| StorageError::WriteFailed {
                table: CHUNKS_TABLE.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(blob_sha, locations = locations.len(), "refreshed blob locations");
        Ok(())
    }

    async fn optimize(&self) -> Result<(), GitCtxError> {
        let count = self.count().await?;
        if count < self.ann_threshold {
            tracing::debug!(count, threshold = self.ann_threshold, "skipping ANN index, below threshold");
            return Ok(());
        }
        let table = self.table(CHUNKS_TABLE).await?;
        table
            .create_index(&["vector"], lancedb::index::Index::Auto)
            .execute()
            .await
            .map_err(|e| StorageError::WriteFailed {
                table: CHUNKS_TABLE.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        head_only: bool,
    ) -> Result<Vec<SearchHit>, GitCtxError> {
        let table = self.table(CHUNKS_TABLE).await?;
        let query = table
            .vector_search(query_vector.to_vec())
            .map_err(|e| StorageError::SearchFailed {
                table: CHUNKS_TABLE.to_string(),
                reason: e.to_string(),
            })?
            .limit(limit);

        let stream = if head_only {
            query
                .only_if("is_head = true")
                .execute()
                .await
        } else {
            query.execute().await
        }
        .map_err(|e| StorageError::SearchFailed {
            table: CHUNKS_TABLE.to_string(),
            reason: e.to_string(),
        })?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| StorageError::SearchFailed {
                table: CHUNKS_TABLE.to_string(),
                reason: e.to_string(),
            })?;

        let mut hits = Vec::new();
        for batch in &batches {
            let distance_array = column::<Float32Array>(batch, "_distance")?;
            let id_array = column::<StringArray>(batch, "id")?;
            let blob_sha_array = column::<StringArray>(batch, "blob_sha")?;
            let chunk_index_array = column::<UInt32Array>(batch, "chunk_index")?;
            let total_chunks_array = column::<UInt32Array>(batch, "total_chunks")?;
            let chunk_content_array = column::<StringArray>(batch, "chunk_content")?;
            let start_line_array = column::<UInt32Array>(batch, "start_line")?;
            let end_line_array = column::<UInt32Array>(batch, "end_line")?;
            let language_array = column::<StringArray>(batch, "language")?;
            let token_count_array = column::<UInt32Array>(batch, "token_count")?;
            let model_array = column::<StringArray>(batch, "model")?;
            let file_path_array = column::<StringArray>(batch, "file_path")?;
            let commit_sha_array = column::<StringArray>(batch, "commit_sha")?;
            let author_name_array = column::<StringArray>(batch, "author_name")?;
            let author_email_array = column::<StringArray>(batch, "author_email")?;
            let commit_date_array = column::<Int64Array>(batch, "commit_date")?;
            let commit_message_array = column::<StringArray>(batch, "commit_message")?;
            let is_head_array = column::<BooleanArray>(batch, "is_head")?;
            let is_merge_array = column::<BooleanArray>(batch, "is_merge")?;

            for i in 0..batch.num_rows() {
                hits.push(SearchHit {
                    distance: distance_array.value(i),
                    record: ChunkRecord {
                        id: id_array.value(i).to_string(),
                        vector: Vec::new(),
                        blob_sha: blob_sha_array.value(i).to_string(),
                        chunk_index: chunk_index_array.value(i) as usize,
                        total_chunks: total_chunks_array.value(i) as usize,
                        chunk_content: chunk_content_array.value(i).to_string(),
                        start_line: start_line_array.value(i) as usize,
                        end_line: end_line_array.value(i) as usize,
                        language: language_array.value(i).to_string(),
                        token_count: token_count_array.value(i) as usize,
                        model: model_array.value(i).to_string(),
                        location: BlobLocation {
                            blob_sha: blob_sha_array.value(i).to_string(),
                            file_path: file_path_array.value(i).to_string(),
                            commit_sha: commit_sha_array.value(i).to_string(),
                            author_name: author_name_array.value(i).to_string(),
                            author_email: author_email_array.value(i).to_string(),
                            commit_date: commit_date_array.value(i),
                            commit_message: commit_message_array.value(i).to_string(),
                            is_head: is_head_array.value(i),
                            is_merge: is_merge_array.value(i),
                        },
                    },
                });
            }
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get_query_embedding(&self, cache_key: &str) -> Result<Option<Vec<f32>>, GitCtxError> {
        let table = self.table(QUERY_CACHE_TABLE).await?;
        let filter = format!("cache_key = '{cache_key}'");
        let stream = table
            .query()
            .only_if(filter)
            .limit(1)
            .execute()
            .await
            .map_err(|e| StorageError::SearchFailed {
                table: QUERY_CACHE_TABLE.to_string(),
                reason: e.to_string(),
            })?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| StorageError::SearchFailed {
                table: QUERY_CACHE_TABLE.to_string(),
                reason: e.to_string(),
            })?;
        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }
            let vector_array = batch
                .column_by_name("vector")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| StorageError::SchemaMismatch("vector column".to_string()))?;
            let values = vector_array
                .value(0)
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| StorageError::SchemaMismatch("vector values".to_string()))?
                .values()
                .to_vec();
            return Ok(Some(values));
        }
        Ok(None)
    }

    async fn cache_query_embedding(
        &self,
        cache_key: &str,
        query_text: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<(), GitCtxError> {
        let _guard = self.lock_for_write()?;
        let table = self.table(QUERY_CACHE_TABLE).await?;
        // Last-write-wins: delete any existing row for this key before inserting.
        let _ = table.delete(&format!("cache_key = '{cache_key}'")).await;

        let schema = self.query_cache_schema();
        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            vec![Some(vector.iter().copied().map(Some).collect::<Vec<_>>())],
            self.dimensions as i32,
        );
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![cache_key])),
                Arc::new(StringArray::from(vec![query_text])),
                Arc::new(vector_array),
                Arc::new(StringArray::from(vec![model])),
                Arc::new(Int64Array::from(vec![0i64])),
            ],
        )
        .map_err(|e| StorageError::WriteFailed {
            table: QUERY_CACHE_TABLE.to_string(),
            reason: e.to_string(),
        })?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| StorageError::WriteFailed {
                table: QUERY_CACHE_TABLE.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn load_index_state(&self) -> Result<IndexState, GitCtxError> {
        let table = self.table(INDEX_STATE_TABLE).await?;
        let stream = table
            .query()
            .only_if("id = 0")
            .limit(1)
            .execute()
            .await
            .map_err(|e| StorageError::SearchFailed {
                table: INDEX_STATE_TABLE.to_string(),
                reason: e.to_string(),
            })?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| StorageError::SearchFailed {
                table: INDEX_STATE_TABLE.to_string(),
                reason: e.to_string(),
            })?;
        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }
            let last_commit = column::<StringArray>(batch, "last_commit")?;
            let shas = column::<StringArray>(batch, "indexed_blob_shas")?;
            let model = column::<StringArray>(batch, "embedding_model")?;
            let ts = column::<Int64Array>(batch, "timestamp")?;
            return Ok(IndexState {
                last_commit: (!last_commit.is_null(0)).then(|| last_commit.value(0).to_string()),
                indexed_blob_shas: shas
                    .value(0)
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
                embedding_model: (!model.is_null(0)).then(|| model.value(0).to_string()),
                timestamp: ts.value(0),
            });
        }
        Ok(IndexState::default())
    }

    async fn save_index_state(&self, state: &IndexState) -> Result<(), GitCtxError> {
        let _guard = self.lock_for_write()?;
        let table = self.table(INDEX_STATE_TABLE).await?;
        let _ = table.delete("id = 0").await;

        let schema = Self::index_state_schema();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(UInt32Array::from(vec![0u32])),
                Arc::new(StringArray::from(vec![state.last_commit.as_deref()])),
                Arc::new(StringArray::from(vec![state.indexed_blob_shas.join(",")])),
                Arc::new(StringArray::from(vec![state.embedding_model.as_deref()])),
                Arc::new(Int64Array::from(vec![state.timestamp])),
            ],
        )
        .map_err(|e| StorageError::WriteFailed {
            table: INDEX_STATE_TABLE.to_string(),
            reason: e.to_string(),
        })?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| StorageError::WriteFailed {
                table: INDEX_STATE_TABLE.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, GitCtxError> {
        let table = self.table(CHUNKS_TABLE).await?;
        table.count_rows(None).await.map_err(|e| {
            StorageError::SearchFailed {
                table: CHUNKS_TABLE.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    async fn get_statistics(&self) -> Result<StoreStatistics, GitCtxError> {
        let table = self.table(CHUNKS_TABLE).await?;
        let total_chunks = table.count_rows(None).await.map_err(|e| StorageError::SearchFailed {
            table: CHUNKS_TABLE.to_string(),
            reason: e.to_string(),
        })?;

        let stream = table
            .query()
            .select(lancedb::query::Select::Columns(vec![
                "file_path".to_string(),
                "blob_sha".to_string(),
                "commit_sha".to_string(),
                "model".to_string(),
            ]))
            .execute()
            .await
            .map_err(|e| StorageError::SearchFailed {
                table: CHUNKS_TABLE.to_string(),
                reason: e.to_string(),
            })?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| StorageError::SearchFailed {
                table: CHUNKS_TABLE.to_string(),
                reason: e.to_string(),
            })?;

        let mut files = std::collections::HashSet::new();
        let mut blobs = std::collections::HashSet::new();
        let mut commits = std::collections::HashSet::new();
        let mut model = None;
        for batch in &batches {
            let file_path = column::<StringArray>(batch, "file_path")?;
            let blob_sha = column::<StringArray>(batch, "blob_sha")?;
            let commit_sha = column::<StringArray>(batch, "commit_sha")?;
            let model_array = column::<StringArray>(batch, "model")?;
            for i in 0..batch.num_rows() {
                files.insert(file_path.value(i).to_string());
                blobs.insert(blob_sha.value(i).to_string());
                commits.insert(commit_sha.value(i).to_string());
                if model.is_none() {
                    model = Some(model_array.value(i).to_string());
                }
            }
        }

        Ok(StoreStatistics {
            total_chunks,
            total_files: files.len(),
            total_blobs: blobs.len(),
            total_commits: commits.len(),
            model,
        })
    }
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, GitCtxError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| StorageError::SchemaMismatch(name.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::BlobLocation;

    fn sample_location(sha: &str, head: bool) -> BlobLocation {
        BlobLocation {
            blob_sha: sha.to_string(),
            file_path: "src/lib.rs".to_string(),
            commit_sha: "abc123".to_string(),
            author_name: "tester".to_string(),
            author_email: "t@example.com".to_string(),
            commit_date: 1_700_000_000,
            commit_message: "init".to_string(),
            is_head: head,
            is_merge: false,
        }
    }

    fn sample_embedding(sha: &str) -> Embedding {
        Embedding {
            vector: vec![0.1, 0.2, 0.3],
            token_count: 10,
            model: "text-embedding-3-small".to_string(),
            cost_usd: 0.0,
            blob_sha: sha.to_string(),
            chunk_index: 0,
            chunk_content: "fn main() {}".to_string(),
            start_line: 1,
            end_line: 1,
            total_chunks: 1,
            language: "rust".to_string(),
            api_token_count: None,
        }
    }

    #[tokio::test]
    async fn open_creates_empty_store_with_zero_count() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LanceStore::open(&tmp.path().join("db"), 3).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_chunks_batch_inserts_one_row_per_location() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LanceStore::open(&tmp.path().join("db"), 3).await.unwrap();

        let embedding = sample_embedding("deadbeef");
        let mut locations = HashMap::new();
        locations.insert(
            "deadbeef".to_string(),
            vec![sample_location("deadbeef", true), sample_location("deadbeef", false)],
        );

        let inserted = store.add_chunks_batch(&[embedding], &locations).await.unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn refresh_locations_preserves_row_count_and_updates_head_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LanceStore::open(&tmp.path().join("db"), 3).await.unwrap();

        let embedding = sample_embedding("deadbeef");
        let mut locations = HashMap::new();
        locations.insert("deadbeef".to_string(), vec![sample_location("deadbeef", true)]);
        store.add_chunks_batch(&[embedding], &locations).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let mut refreshed = sample_location("deadbeef", false);
        refreshed.commit_sha = "def456".to_string();
        store.refresh_locations("deadbeef", &[refreshed]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1, "refresh must not change row count");

        let hits = store.search(&[0.1, 0.2, 0.3], 10, false).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.location.commit_sha, "def456");
        assert!(!hits[0].record.location.is_head);
    }

    #[tokio::test]
    async fn refresh_locations_on_unknown_blob_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LanceStore::open(&tmp.path().join("db"), 3).await.unwrap();
        store
            .refresh_locations("nonexistent", &[sample_location("nonexistent", true)])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn head_only_search_excludes_non_head_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LanceStore::open(&tmp.path().join("db"), 3).await.unwrap();

        let head_embedding = sample_embedding("head-sha");
        let mut head_locations = HashMap::new();
        head_locations.insert("head-sha".to_string(), vec![sample_location("head-sha", true)]);
        store.add_chunks_batch(&[head_embedding], &head_locations).await.unwrap();

        let non_head_embedding = sample_embedding("stale-sha");
        let mut non_head_locations = HashMap::new();
        non_head_locations
            .insert("stale-sha".to_string(), vec![sample_location("stale-sha", false)]);
        store.add_chunks_batch(&[non_head_embedding], &non_head_locations).await.unwrap();

        let all_hits = store.search(&[0.1, 0.2, 0.3], 10, false).await.unwrap();
        assert_eq!(all_hits.len(), 2);

        let head_hits = store.search(&[0.1, 0.2, 0.3], 10, true).await.unwrap();
        assert_eq!(head_hits.len(), 1);
        assert_eq!(head_hits[0].record.blob_sha, "head-sha");
    }

    #[tokio::test]
    async fn index_state_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LanceStore::open(&tmp.path().join("db"), 3).await.unwrap();

        let state = IndexState {
            last_commit: Some("abc123".to_string()),
            indexed_blob_shas: vec!["a".to_string(), "b".to_string()],
            embedding_model: Some("text-embedding-3-small".to_string()),
            timestamp: 1_700_000_000,
        };
        store.save_index_state(&state).await.unwrap();

        let loaded = store.load_index_state().await.unwrap();
        assert_eq!(loaded.last_commit, state.last_commit);
        assert_eq!(loaded.indexed_blob_shas, state.indexed_blob_shas);
    }

    #[tokio::test]
    async fn query_cache_round_trips_and_last_write_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LanceStore::open(&tmp.path().join("db"), 3).await.unwrap();

        store
            .cache_query_embedding("key1", "hello", &[0.1, 0.2, 0.3], "text-embedding-3-small")
            .await
            .unwrap();
        let cached = store.get_query_embedding("key1").await.unwrap();
        assert_eq!(cached, Some(vec![0.1, 0.2, 0.3]));

        store
            .cache_query_embedding("key1", "hello", &[0.9, 0.9, 0.9], "text-embedding-3-small")
            .await
            .unwrap();
        let updated = store.get_query_embedding("key1").await.unwrap();
        assert_eq!(updated, Some(vec![0.9, 0.9, 0.9]));
    }
}
