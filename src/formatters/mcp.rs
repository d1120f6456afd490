use super::Formatter;
use crate::store::SearchHit;
use serde_json::json;

/// JSON array of hit objects — the shape an MCP client would expect, but
/// emitted as a plain `--format mcp` string; no RPC transport is involved.
pub struct McpFormatter;

impl Formatter for McpFormatter {
    fn name(&self) -> &'static str {
        "mcp"
    }

    fn format(&self, hits: &[SearchHit]) -> String {
        let values: Vec<serde_json::Value> = hits
            .iter()
            .map(|hit| {
                let record = &hit.record;
                let loc = &record.location;
                json!({
                    "file_path": loc.file_path,
                    "start_line": record.start_line,
                    "end_line": record.end_line,
                    "distance": hit.distance,
                    "is_head": loc.is_head,
                    "is_merge": loc.is_merge,
                    "commit_sha": loc.commit_sha,
                    "commit_date": loc.commit_date,
                    "author_name": loc.author_name,
                    "author_email": loc.author_email,
                    "commit_message": loc.commit_message,
                    "language": record.language,
                    "chunk_index": record.chunk_index,
                    "total_chunks": record.total_chunks,
                    "token_count": record.token_count,
                    "model": record.model,
                    "chunk_content": record.chunk_content,
                })
            })
            .collect();
        serde_json::to_string_pretty(&values).unwrap_or_else(|_| "[]".to_string())
    }
}
