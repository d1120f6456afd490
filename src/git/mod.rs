//! Git repository access: a commit-graph walker that deduplicates blob
//! content across the full history of a repository.
/// Commit-graph walker with blob-level deduplication.
pub mod walker;

pub use walker::{BlobLocation, BlobRecord, CommitWalker, Progress, WalkStats};
