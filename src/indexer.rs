//! Index orchestrator: walk -> (skip | chunk -> embed) -> store -> optimize.
use crate::chunker;
use crate::config::Settings;
use crate::embedding::Embedder;
use crate::error::GitCtxError;
use crate::git::{BlobRecord, CommitWalker};
use crate::store::{IndexState, LocationsBySha, VectorStore};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// Outcome of one `index` run, reported to the CLI layer.
#[derive(Debug, Default)]
pub struct IndexSummary {
    pub commits_seen: usize,
    pub blobs_seen: usize,
    pub blobs_embedded: usize,
    pub blobs_skipped: usize,
    pub blobs_failed: usize,
    pub chunks_indexed: usize,
    pub cancelled: bool,
}

/// Walks `repo_path`, embeds new blobs, and writes them to `store`.
///
/// `cancel` is polled between blobs; once it reports `true` the walk stops
/// and whatever has already been written to `store` is left in place (the
/// store is additive and idempotent on `id`, so a cancelled run is always
/// safe to resume by running `index` again).
pub async fn run_index(
    repo_path: &Path,
    settings: &Settings,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    mut cancel: watch::Receiver<bool>,
) -> Result<IndexSummary, GitCtxError> {
    let walker = CommitWalker::discover(repo_path)?;
    let state = store.load_index_state().await?;
    let same_model = state.embedding_model.as_deref() == Some(embedder.model_name());
    let already_indexed: HashSet<String> = if same_model {
        state.indexed_blob_shas.iter().cloned().collect()
    } else {
        HashSet::new()
    };

    let walk_span = tracing::info_span!("walk_blobs");
    let _enter = walk_span.enter();
    let walker_for_blocking = walker;
    let (blobs, stats) = tokio::task::spawn_blocking(move || {
        walker_for_blocking.walk_blobs(|progress| {
            if progress.commits_seen % 100 == 0 {
                tracing::info!(
                    commits = progress.commits_seen,
                    blobs = progress.unique_blobs,
                    "walking commit history"
                );
            }
        })
    })
    .await
    .map_err(|e| GitCtxError::other(format!("walker task panicked: {e}")))??;
    drop(_enter);

    tracing::info!(
        commits = stats.commits_seen,
        blobs = stats.blobs_indexed,
        "commit walk complete"
    );

    let mut summary = IndexSummary {
        commits_seen: stats.commits_seen,
        blobs_seen: blobs.len(),
        ..Default::default()
    };
    let mut all_blob_shas: Vec<String> = Vec::with_capacity(blobs.len());

    for blob in blobs {
        if *cancel.borrow() {
            tracing::warn!("index cancelled, stopping before next blob");
            summary.cancelled = true;
            break;
        }

        all_blob_shas.push(blob.sha.clone());

        if already_indexed.contains(&blob.sha) {
            if let Err(err) = store.refresh_locations(&blob.sha, &blob.locations).await {
                return Err(err);
            }
            summary.blobs_skipped += 1;
            continue;
        }

        match embed_blob(&blob, settings, embedder.as_ref()).await {
            Ok(embeddings) if embeddings.is_empty() => {
                summary.blobs_skipped += 1;
            }
            Ok(embeddings) => {
                let mut locations: LocationsBySha = LocationsBySha::new();
                locations.insert(blob.sha.clone(), blob.locations.clone());
                summary.chunks_indexed += embeddings.len();
                store.add_chunks_batch(&embeddings, &locations).await?;
                summary.blobs_embedded += 1;
            }
            Err(err) => {
                tracing::warn!(blob_sha = %blob.sha, error = %err, "skipping blob after embedding failure");
                summary.blobs_failed += 1;
            }
        }
    }

    store.optimize().await?;

    if !summary.cancelled {
        let head_commit = walker_head_commit(repo_path)?;
        store
            .save_index_state(&IndexState {
                last_commit: Some(head_commit),
                indexed_blob_shas: all_blob_shas,
                embedding_model: Some(embedder.model_name().to_string()),
                timestamp: chrono::Utc::now().timestamp(),
            })
            .await?;
    }

    Ok(summary)
}

async fn embed_blob(
    blob: &BlobRecord,
    settings: &Settings,
    embedder: &dyn Embedder,
) -> Result<Vec<crate::embedding::Embedding>, GitCtxError> {
    if std::str::from_utf8(&blob.content).is_err() {
        return Ok(Vec::new());
    }
    let content = String::from_utf8_lossy(&blob.content).into_owned();
    let language = blob
        .locations
        .first()
        .and_then(|loc| Path::new(&loc.file_path).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_string);

    let chunks = chunker::chunk_file(
        &content,
        &blob.sha,
        language.as_deref(),
        settings.chunk_max_tokens,
    );
    if chunks.is_empty() {
        return Ok(Vec::new());
    }
    embedder.embed_chunks(&blob.sha, &chunks).await
}

/// Re-opens the repository to read `HEAD` after the walk, since
/// [`CommitWalker`] was moved into the blocking task above.
fn walker_head_commit(repo_path: &Path) -> Result<String, GitCtxError> {
    CommitWalker::discover(repo_path)?.head_commit_sha()
}
