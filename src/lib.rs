//! # gitctx - semantic code search over a git repository's full history
//!
//! `gitctx` walks every commit reachable from a repository's refs, dedupes
//! identical blob content across that history, chunks and embeds each
//! unique blob once, and stores the result in a denormalized vector table
//! that can be searched from the command line.
//!
//! ## Architecture
//!
//! ```text
//! index:  CommitWalker -> chunker -> Embedder -> VectorStore
//! search: query -> query-embedding cache -> Embedder -> VectorStore::search -> Formatter
//! ```
//!
//! ## Modules
//!
//! - [`models`]: embedding model registry (dimensions, token budget, price)
//! - [`chunker`]: token-bounded, declaration-boundary-aware chunking
//! - [`embedding`]: async `Embedder` trait and an OpenAI-compatible HTTP implementation
//! - [`git`]: commit-graph walking with blob-level deduplication
//! - [`store`]: the `VectorStore` trait and its LanceDB-backed implementation
//! - [`indexer`]: the `index` orchestrator
//! - [`search`]: the `search` orchestrator
//! - [`config`]: layered YAML configuration
//! - [`formatters`]: `terse`/`verbose`/`mcp` search output formats
//! - [`tips`]: first-run marker-file mechanism
//! - [`error`]: error taxonomy and result aliases
//! - [`paths`]: `.gitctx` directory resolution

/// Layered configuration (env > repo file > user file > defaults).
pub mod config;

/// Token-bounded, declaration-boundary-aware chunking.
pub mod chunker;

/// Async embedding generation over OpenAI-compatible HTTP providers.
pub mod embedding;

/// Error types and utilities.
pub mod error;

/// Output formatters for search results.
pub mod formatters;

/// Git commit-graph walking with blob-level deduplication.
pub mod git;

/// The `index` orchestrator.
pub mod indexer;

/// Static embedding model registry.
pub mod models;

/// Path resolution for `.gitctx` directories.
pub mod paths;

/// The `search` orchestrator.
pub mod search;

/// Vector store trait and LanceDB-backed implementation.
pub mod store;

/// First-run tip marker-file mechanism.
pub mod tips;
