use clap::{Parser, Subcommand};
use gitctx::config::Settings;
use gitctx::embedding::OpenAiCompatibleEmbedder;
use gitctx::error::GitCtxError;
use gitctx::store::LanceStore;
use std::panic;
use std::sync::Arc;

/// gitctx: semantic code search over a git repository's full commit history
#[derive(Parser)]
#[command(name = "gitctx")]
#[command(version = concat!("version ", env!("CARGO_PKG_VERSION")))]
#[command(about = "Semantic code search over a git repository's full commit history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the repository at the current working directory and build/refresh .gitctx/db
    Index,

    /// Search the index for `query`
    Search {
        query: String,

        #[arg(long, short = 'n')]
        limit: Option<usize>,

        /// Only return hits from the current HEAD
        #[arg(long)]
        head: bool,

        #[arg(long, value_name = "FORMAT")]
        format: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    setup_panic_handler();

    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {err}");
            err.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), GitCtxError> {
    tracing::info!(build = %build_info(), "starting");
    let repo_path = std::env::current_dir()?;
    let settings = Settings::load(&repo_path)?;

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received interrupt signal, cancelling");
            let _ = cancel_tx.send(true);
        }
    });

    match cli.command {
        Commands::Index => run_index_command(&repo_path, &settings, cancel_rx).await,
        Commands::Search {
            query,
            limit,
            head,
            format,
        } => run_search_command(&settings, &query, limit, head, format).await,
    }
}

async fn run_index_command(
    repo_path: &std::path::Path,
    settings: &Settings,
    cancel_rx: tokio::sync::watch::Receiver<bool>,
) -> Result<(), GitCtxError> {
    if gitctx::tips::is_first_run("index") {
        println!("Tip: gitctx index walks your full git history; this may take a while on large repos.");
        let _ = gitctx::tips::mark_run("index");
    }

    let (embedder, store) = build_client(settings).await?;
    let summary = gitctx::indexer::run_index(repo_path, settings, embedder, store, cancel_rx).await?;
    println!(
        "indexed {} blobs ({} embedded, {} skipped, {} failed), {} chunks, {} commits seen",
        summary.blobs_seen,
        summary.blobs_embedded,
        summary.blobs_skipped,
        summary.blobs_failed,
        summary.chunks_indexed,
        summary.commits_seen,
    );
    if summary.cancelled {
        println!("index run was cancelled before completion");
        std::process::exit(130);
    }
    Ok(())
}

async fn run_search_command(
    settings: &Settings,
    query: &str,
    limit: Option<usize>,
    head_only: bool,
    format: Option<String>,
) -> Result<(), GitCtxError> {
    if gitctx::tips::is_first_run("search") {
        println!("Tip: results are ranked by cosine distance; smaller is more similar.");
        let _ = gitctx::tips::mark_run("search");
    }

    let (embedder, store) = build_client(settings).await?;

    let limit = limit.unwrap_or(settings.search_default_limit);
    let format_name = format.unwrap_or_else(|| settings.search_default_format.clone());
    let formatter = gitctx::formatters::get_formatter(&format_name)?;

    let hits = gitctx::search::run_search(query, limit, head_only, embedder, store).await?;
    println!("{}", formatter.format(&hits));
    Ok(())
}

/// Global panic handler: logs panic location/message/backtrace via `tracing`
/// before the process exits, so a killed index run leaves a diagnosable trace.
fn setup_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic message".to_string()
        };

        tracing::error!("PANIC at {}: {}\nBacktrace:\n{:?}", location, message, backtrace);
        eprintln!("\n!!! PANIC !!!\nLocation: {location}\nMessage: {message}\n");
    }));
}

/// Constructs the embedder/store pair shared by `index` and `search`,
/// wiring the resolved [`Settings`] into both.
async fn build_client(
    settings: &Settings,
) -> Result<(Arc<dyn gitctx::embedding::Embedder>, Arc<dyn gitctx::store::VectorStore>), GitCtxError> {
    let api_key = settings.require_api_key()?.to_string();
    let embedder: Arc<dyn gitctx::embedding::Embedder> = Arc::new(
        OpenAiCompatibleEmbedder::new(api_key, &settings.embedding_model)?
            .with_chunk_cap(settings.embedding_batch_size)
            .with_concurrency(settings.embedding_concurrency)
            .with_batch_timeout(std::time::Duration::from_secs(settings.embedding_timeout_secs)),
    );
    let store: Arc<dyn gitctx::store::VectorStore> = Arc::new(
        LanceStore::open(&settings.vector_store_path, embedder.dimensions())
            .await?
            .with_ann_threshold(settings.ann_index_threshold),
    );
    Ok((embedder, store))
}

fn build_info() -> String {
    format!(
        "gitctx {} (commit {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP"),
    )
}
