use super::Formatter;
use crate::store::SearchHit;
use chrono::{TimeZone, Utc};

pub struct VerboseFormatter;

impl Formatter for VerboseFormatter {
    fn name(&self) -> &'static str {
        "verbose"
    }

    fn format(&self, hits: &[SearchHit]) -> String {
        hits.iter()
            .enumerate()
            .map(|(i, hit)| format_block(i, hit))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn format_block(index: usize, hit: &SearchHit) -> String {
    let record = &hit.record;
    let loc = &record.location;
    let date = Utc
        .timestamp_opt(loc.commit_date, 0)
        .single()
        .map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown-date".to_string());

    format!(
        "[{index}] {file}:{start}-{end} (score {score:.4}{head})\n\
         commit  {sha} ({date})\n\
         author  {author} <{email}>\n\
         message {message}\n\
         lang    {lang}, chunk {chunk_index}/{total_chunks}, {tokens} tokens\n\
         ---\n{content}",
        index = index,
        file = loc.file_path,
        start = record.start_line,
        end = record.end_line,
        score = hit.distance,
        head = if loc.is_head { ", HEAD" } else { "" },
        sha = loc.commit_sha,
        date = date,
        author = loc.author_name,
        email = loc.author_email,
        message = loc.commit_message.lines().next().unwrap_or(""),
        lang = record.language,
        chunk_index = record.chunk_index,
        total_chunks = record.total_chunks,
        tokens = record.token_count,
        content = record.chunk_content,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::BlobLocation;
    use crate::store::ChunkRecord;

    #[test]
    fn block_includes_full_message_and_content() {
        let hit = SearchHit {
            distance: 0.5,
            record: ChunkRecord {
                id: "sha:0:0".to_string(),
                vector: vec![],
                blob_sha: "sha".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                chunk_content: "fn main() {}".to_string(),
                start_line: 1,
                end_line: 3,
                language: "rust".to_string(),
                token_count: 5,
                model: "text-embedding-3-small".to_string(),
                location: BlobLocation {
                    blob_sha: "sha".to_string(),
                    file_path: "src/main.rs".to_string(),
                    commit_sha: "abc123def456".to_string(),
                    author_name: "Alice".to_string(),
                    author_email: "alice@example.com".to_string(),
                    commit_date: 1_727_827_200,
                    commit_message: "Add OAuth support".to_string(),
                    is_head: true,
                    is_merge: false,
                },
            },
        };
        let out = VerboseFormatter.format(&[hit]);
        assert!(out.contains("alice@example.com"));
        assert!(out.contains("fn main() {}"));
        assert!(out.contains("HEAD"));
    }
}
