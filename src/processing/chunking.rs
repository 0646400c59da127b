//! Character-budget chunking with semantic boundaries and sliding overlap.
//!
//! Chunk boundaries come from `semchunk-rs`, which prefers the largest available separator
//! (blank lines, then newlines, then sentence punctuation, then whitespace) and only splits
//! raw characters as a last resort. Lengths are measured in characters, not tokens.
//!
//! The semantic merge can overshoot its budget by one segment, so any piece over the budget is
//! split again on paragraph, line, sentence and word boundaries before anything else happens.
//!
//! Overlap is applied after the semantic split: every chunk but the first is prefixed with the
//! tail of its predecessor. The semantic split runs at `chunk_size - overlap` so that the
//! overlapped result still fits in `chunk_size`.

use semchunk_rs::Chunker;

use super::types::{Chunk, ChunkingError, PageText};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Boundaries used to re-split oversized pieces, coarsest first.
const RESPLIT_SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split every page into overlapping chunks tagged with `source` and the page number.
///
/// Pages are chunked independently so a chunk never straddles two pages. Whitespace-only pages
/// contribute nothing.
pub fn chunk_pages(
    pages: &[PageText],
    source: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkingError> {
    let mut chunks = Vec::new();
    for page in pages {
        for text in chunk_text(&page.text, chunk_size, overlap)? {
            chunks.push(Chunk::new(text, source, page.page));
        }
    }
    Ok(chunks)
}

/// Chunk text into segments of at most `chunk_size` characters.
///
/// `overlap` is clamped to half of `chunk_size`. Returns an empty vector when the input text is all
/// whitespace.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let overlap = overlap.min(chunk_size / 2);
    let budget = chunk_size - overlap;
    let chunker = Chunker::new(budget, Box::new(char_len));
    let mut base_chunks = Vec::new();
    for piece in chunker.chunk(text) {
        split_to_budget(&piece, budget, &RESPLIT_SEPARATORS, &mut base_chunks);
    }
    Ok(apply_overlap(base_chunks, chunk_size, overlap))
}

fn char_len(segment: &str) -> usize {
    segment.chars().count()
}

/// Push `text` onto `out` as trimmed pieces of at most `budget` characters.
///
/// Splits on the coarsest separator present, greedily re-merges neighbouring segments, and
/// recurses into finer separators for segments that are still too long. Text with no separator
/// left is cut every `budget` characters.
fn split_to_budget(text: &str, budget: usize, separators: &[&str], out: &mut Vec<String>) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    if char_len(trimmed) <= budget {
        out.push(trimmed.to_string());
        return;
    }

    let Some(position) = separators.iter().position(|sep| trimmed.contains(sep)) else {
        let chars: Vec<char> = trimmed.chars().collect();
        for window in chars.chunks(budget) {
            push_trimmed(&window.iter().collect::<String>(), out);
        }
        return;
    };
    let finer = &separators[position + 1..];

    let mut current = String::new();
    for segment in trimmed.split_inclusive(separators[position]) {
        if char_len(segment.trim()) > budget {
            push_trimmed(&current, out);
            current.clear();
            split_to_budget(segment, budget, finer, out);
            continue;
        }
        let mut candidate = current.clone();
        candidate.push_str(segment);
        if char_len(candidate.trim()) <= budget {
            current = candidate;
        } else {
            push_trimmed(&current, out);
            current = segment.to_string();
        }
    }
    push_trimmed(&current, out);
}

fn push_trimmed(text: &str, out: &mut Vec<String>) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn apply_overlap(chunks: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    for (idx, current) in chunks.iter().enumerate() {
        if idx == 0 {
            overlapped.push(current.clone());
            continue;
        }
        overlapped.push(build_overlapped_chunk(
            &chunks[idx - 1],
            current,
            overlap,
            chunk_size,
        ));
    }
    overlapped
}

fn build_overlapped_chunk(previous: &str, current: &str, overlap: usize, chunk_size: usize) -> String {
    let tail = tail_at_word_boundary(previous, overlap);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    trim_to_char_budget(&combined, chunk_size).to_string()
}

/// Last `limit` characters of `text`, advanced to the next word start when the cut lands
/// inside a word.
fn tail_at_word_boundary(text: &str, limit: usize) -> &str {
    if limit == 0 {
        return "";
    }
    let total = char_len(text);
    if total <= limit {
        return text.trim_start();
    }

    let cut = byte_offset_of_char(text, total - limit);
    let tail = &text[cut..];
    let cut_inside_word = text[..cut]
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_whitespace())
        && !starts_with_whitespace(tail);

    if cut_inside_word {
        if let Some(space) = tail.find(char::is_whitespace) {
            return tail[space..].trim_start();
        }
    }
    tail.trim_start()
}

/// Drop leading characters until `text` fits in `budget` characters.
fn trim_to_char_budget(text: &str, budget: usize) -> &str {
    let total = char_len(text);
    if total <= budget {
        return text;
    }
    text[byte_offset_of_char(text, total - budget)..].trim_start()
}

fn byte_offset_of_char(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}
