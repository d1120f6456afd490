use super::{unicode_capable, Formatter};
use crate::store::SearchHit;
use chrono::{TimeZone, Utc};

pub struct TerseFormatter;

impl Formatter for TerseFormatter {
    fn name(&self) -> &'static str {
        "terse"
    }

    fn format(&self, hits: &[SearchHit]) -> String {
        let ascii = !unicode_capable();
        hits.iter()
            .map(|hit| format_line(hit, ascii))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn format_line(hit: &SearchHit, ascii: bool) -> String {
    let loc = &hit.record.location;
    let head_marker = if loc.is_head {
        if ascii { " [HEAD]" } else { " ●" }
    } else if ascii {
        "       "
    } else {
        "  "
    };
    let date = Utc
        .timestamp_opt(loc.commit_date, 0)
        .single()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown-date".to_string());
    let first_line = loc.commit_message.lines().next().unwrap_or("");
    let truncated: String = first_line.chars().take(50).collect();
    let short_sha: String = loc.commit_sha.chars().take(7).collect();

    format!(
        "{}:{}:{:.2}{} {} ({}, {}) \"{}\"",
        loc.file_path,
        hit.record.start_line,
        hit.distance,
        head_marker,
        short_sha,
        date,
        loc.author_name,
        truncated,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::BlobLocation;
    use crate::store::ChunkRecord;

    fn sample_hit(is_head: bool) -> SearchHit {
        SearchHit {
            distance: 0.1234,
            record: ChunkRecord {
                id: "sha:0:0".to_string(),
                vector: vec![],
                blob_sha: "sha".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                chunk_content: "fn main() {}".to_string(),
                start_line: 42,
                end_line: 42,
                language: "rust".to_string(),
                token_count: 3,
                model: "text-embedding-3-small".to_string(),
                location: BlobLocation {
                    blob_sha: "sha".to_string(),
                    file_path: "src/main.rs".to_string(),
                    commit_sha: "f9e8d7c6b5a4".to_string(),
                    author_name: "Alice".to_string(),
                    author_email: "alice@example.com".to_string(),
                    commit_date: 1_727_827_200,
                    commit_message: "Add OAuth support\n\nLonger body.".to_string(),
                    is_head,
                    is_merge: false,
                },
            },
        }
    }

    #[test]
    fn head_hit_line_matches_normative_format() {
        let line = format_line(&sample_hit(true), true);
        assert_eq!(
            line,
            "src/main.rs:42:0.12 [HEAD] f9e8d7c (2024-10-02, Alice) \"Add OAuth support\""
        );
    }

    #[test]
    fn non_head_hit_has_no_marker() {
        let line = format_line(&sample_hit(false), true);
        assert!(line.starts_with("src/main.rs:42:0.12        f9e8d7c"));
    }

    #[test]
    fn message_is_truncated_to_fifty_chars() {
        let mut hit = sample_hit(true);
        hit.record.location.commit_message = "x".repeat(200);
        let line = format_line(&hit, true);
        let quoted = line.split('"').nth(1).unwrap();
        assert_eq!(quoted.len(), 50);
    }
}
