//! Simple integration tests for the config/chunker/formatter surface,
//! exercised together without touching the network or a git repository.
use gitctx::config::{RawSettings, Settings};
use gitctx::formatters::get_formatter;
use gitctx::git::BlobLocation;
use gitctx::models;
use gitctx::store::{ChunkRecord, SearchHit};
use std::path::Path;

#[test]
fn settings_resolve_pulls_dimensions_from_chosen_model() {
    let raw = RawSettings {
        embedding_model: Some("text-embedding-3-large".to_string()),
        ..Default::default()
    };
    let settings = Settings::resolve(raw, Path::new("/tmp/some-repo")).unwrap();
    let spec = models::lookup(&settings.embedding_model).unwrap();
    assert_eq!(spec.dimensions, 3072);
    assert_eq!(settings.chunk_max_tokens, spec.max_tokens);
}

#[test]
fn settings_resolve_respects_explicit_chunk_max_tokens_override() {
    let raw = RawSettings {
        embedding_model: Some("text-embedding-3-small".to_string()),
        chunk_max_tokens: Some(512),
        ..Default::default()
    };
    let settings = Settings::resolve(raw, Path::new("/tmp/some-repo")).unwrap();
    assert_eq!(settings.chunk_max_tokens, 512);
}

#[test]
fn chunking_respects_the_resolved_token_budget() {
    let settings =
        Settings::resolve(RawSettings::default(), Path::new("/tmp/some-repo")).unwrap();
    let content = "fn helper() {\n    println!(\"hi\");\n}\n".repeat(50);
    let chunks =
        gitctx::chunker::chunk_file(&content, "deadbeef", Some("rs"), settings.chunk_max_tokens);
    assert!(!chunks.is_empty());
    for chunk in &chunks {
        assert!(chunk.token_count <= settings.chunk_max_tokens);
    }
}

fn sample_hit(file_path: &str, score: f32) -> SearchHit {
    SearchHit {
        distance: score,
        record: ChunkRecord {
            id: format!("{file_path}:0:0"),
            vector: vec![],
            blob_sha: "deadbeef".to_string(),
            chunk_index: 0,
            total_chunks: 1,
            chunk_content: "fn main() {}".to_string(),
            start_line: 1,
            end_line: 1,
            language: "rust".to_string(),
            token_count: 4,
            model: "text-embedding-3-small".to_string(),
            location: BlobLocation {
                blob_sha: "deadbeef".to_string(),
                file_path: file_path.to_string(),
                commit_sha: "cafef00d".to_string(),
                author_name: "tester".to_string(),
                author_email: "tester@example.com".to_string(),
                commit_date: 1_700_000_000,
                commit_message: "initial commit".to_string(),
                is_head: true,
                is_merge: false,
            },
        },
    }
}

#[test]
fn every_registered_formatter_renders_a_nonempty_result_for_the_same_hits() {
    let hits = vec![sample_hit("src/main.rs", 0.12)];
    for name in ["terse", "verbose", "mcp"] {
        let formatter = get_formatter(name).unwrap();
        let output = formatter.format(&hits);
        assert!(!output.is_empty(), "{name} formatter produced empty output");
        assert!(output.contains("src/main.rs"), "{name} formatter dropped the file path");
    }
}

#[test]
fn mcp_formatter_output_parses_as_json_array_of_expected_length() {
    let hits = vec![sample_hit("a.rs", 0.1), sample_hit("b.rs", 0.2)];
    let output = get_formatter("mcp").unwrap().format(&hits);
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 2);
}
