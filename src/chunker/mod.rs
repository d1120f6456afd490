//! Token-bounded chunking of blob content.
//!
//! Splits a blob's text into [`CodeChunk`]s that never exceed a token
//! budget, preferring to break at declaration boundaries (via
//! `tree-sitter`), then blank-line paragraphs, then newlines, then
//! arbitrary character windows, in that order.
mod ast;

use std::collections::HashMap;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

/// A token-bounded slice of a blob.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeChunk {
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub token_count: usize,
    pub metadata: HashMap<String, String>,
}

fn tokenizer() -> &'static CoreBPE {
    static TOKENIZER: OnceLock<CoreBPE> = OnceLock::new();
    TOKENIZER.get_or_init(|| tiktoken_rs::cl100k_base().expect("cl100k_base tokenizer assets"))
}

/// Token count using the embedding model's cl100k-style BPE tokenizer.
pub fn count_tokens(text: &str) -> usize {
    tokenizer().encode_with_special_tokens(text).len()
}

/// Truncate `text` to at most `max_tokens` tokens, at a token boundary.
fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let bpe = tokenizer();
    let tokens = bpe.encode_with_special_tokens(text);
    if tokens.len() <= max_tokens {
        return text.to_string();
    }
    bpe.decode(tokens[..max_tokens].to_vec())
        .unwrap_or_else(|_| text.to_string())
}

/// Chunk overlap between adjacent chunks, as a fraction of `max_tokens`.
/// Zero by default, matching the original implementation's chunker, which
/// has no overlap parameter. Kept as a documented, unused-by-default knob
/// rather than wired into any interface.
#[allow(dead_code)]
const CHUNK_OVERLAP_RATIO: f32 = 0.0;

/// Split `content` (already replacement-decoded to UTF-8) into token-bounded
/// chunks. Returns an empty vec for empty content. `language` drives the
/// tree-sitter grammar selection for declaration-boundary splitting; an
/// unrecognized or `None` language falls back straight to line/window
/// splitting. `blob_sha` is stamped onto every chunk's metadata so it
/// survives independently of the embedding call that follows.
pub fn chunk_file(
    content: &str,
    blob_sha: &str,
    language: Option<&str>,
    max_tokens: usize,
) -> Vec<CodeChunk> {
    if content.is_empty() {
        return Vec::new();
    }

    let segments = match language.and_then(|lang| ast::declaration_segments(lang, content)) {
        Some(segments) if !segments.is_empty() => segments,
        _ => paragraph_segments(content),
    };

    let mut pieces: Vec<(String, usize, usize)> = Vec::new();
    for seg in segments {
        split_segment_to_budget(&seg, max_tokens, &mut pieces);
    }

    let total_chunks = pieces.len();
    let lang_label = language.unwrap_or("unknown").to_string();
    pieces
        .into_iter()
        .enumerate()
        .map(|(idx, (text, start_line, end_line))| {
            let token_count = count_tokens(&text);
            let mut metadata = HashMap::new();
            metadata.insert("blob_sha".to_string(), blob_sha.to_string());
            metadata.insert("chunk_index".to_string(), idx.to_string());
            metadata.insert("total_chunks".to_string(), total_chunks.to_string());
            metadata.insert("language".to_string(), lang_label.clone());
            CodeChunk {
                content: text,
                start_line,
                end_line,
                token_count,
                metadata,
            }
        })
        .collect()
}

pub(super) struct Segment {
    pub(super) text: String,
    pub(super) start_line: usize,
}

/// Blank-line-separated paragraphs, each tagged with its starting line.
/// Blank lines are kept, appended to the paragraph they close, so the
/// concatenation of every returned segment's `text` reproduces `content`
/// exactly.
fn paragraph_segments(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_start = 1usize;
    let mut has_content = false;

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        if current.is_empty() {
            current_start = line_no;
        }
        current.push_str(line);
        current.push('\n');

        if line.trim().is_empty() {
            if has_content {
                segments.push(Segment {
                    text: std::mem::take(&mut current),
                    start_line: current_start,
                });
                has_content = false;
            }
        } else {
            has_content = true;
        }
    }
    if !current.is_empty() {
        segments.push(Segment {
            text: current,
            start_line: current_start,
        });
    }
    segments
}

/// Split a single segment (already declaration- or paragraph-bounded) into
/// pieces that each fit within `max_tokens`, falling back to line-by-line
/// and then character-window splitting for oversize segments.
fn split_segment_to_budget(
    seg: &Segment,
    max_tokens: usize,
    out: &mut Vec<(String, usize, usize)>,
) {
    let token_count = count_tokens(&seg.text);
    if token_count <= max_tokens {
        let end_line = seg.start_line + seg.text.lines().count().saturating_sub(1);
        out.push((seg.text.clone(), seg.start_line, end_line.max(seg.start_line)));
        return;
    }

    // Too big for one chunk: fall back to line-by-line accumulation.
    let mut buf = String::new();
    let mut buf_start = seg.start_line;
    let mut line_no = seg.start_line;
    for line in seg.text.lines() {
        let candidate = if buf.is_empty() {
            line.to_string()
        } else {
            format!("{buf}\n{line}")
        };
        if count_tokens(&candidate) > max_tokens && !buf.is_empty() {
            let end_line = line_no.saturating_sub(1).max(buf_start);
            out.push((buf.clone(), buf_start, end_line));
            buf.clear();
            buf_start = line_no;
            buf = line.to_string();
        } else {
            buf = candidate;
        }

        // A single line alone may still exceed the budget; truncate at the
        // token boundary nearest max_tokens rather than looping forever.
        if count_tokens(&buf) > max_tokens {
            let truncated = truncate_to_tokens(&buf, max_tokens);
            out.push((truncated, buf_start, line_no));
            buf.clear();
            buf_start = line_no + 1;
        }
        line_no += 1;
    }
    if !buf.is_empty() {
        let end_line = line_no.saturating_sub(1).max(buf_start);
        out.push((buf, buf_start, end_line));
    }
}
