use std::sync::OnceLock;

use regex::Regex;

use super::types::Chunk;

/// Rough characters-per-word ratio used to turn the overlap size into a word count.
const CHARS_PER_WORD: usize = 5;

static SENTENCE_BREAK: OnceLock<Regex> = OnceLock::new();

fn sentence_break() -> &'static Regex {
    SENTENCE_BREAK.get_or_init(|| Regex::new(r"[.!?]+\s+").expect("valid sentence pattern"))
}

/// Split on terminal punctuation followed by whitespace, dropping empty units.
fn split_sentences(text: &str) -> Vec<&str> {
    sentence_break()
        .split(text)
        .map(|unit| unit.trim().trim_end_matches(['.', '!', '?']).trim_end())
        .filter(|unit| !unit.is_empty())
        .collect()
}

fn overlap_tail(buffer: &str, words: usize) -> String {
    if words == 0 {
        return String::new();
    }
    let all: Vec<&str> = buffer.split_whitespace().collect();
    all[all.len().saturating_sub(words)..].join(" ")
}

/// Split `text` into sentence-respecting windows of roughly `target_size` characters.
///
/// Each new window is seeded with the last `overlap_size / 5` words of the previous one.
/// A sentence is never split, so a single sentence longer than `target_size` becomes its
/// own oversized chunk.
pub fn chunk_text(text: &str, target_size: usize, overlap_size: usize) -> Vec<String> {
    let overlap_words = overlap_size / CHARS_PER_WORD;
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0usize;

    for sentence in split_sentences(text) {
        let sentence_chars = sentence.chars().count();

        if buffer_chars > 0 && buffer_chars + sentence_chars > target_size {
            let closed = buffer.trim().to_string();
            let tail = overlap_tail(&closed, overlap_words);
            chunks.push(closed);

            buffer.clear();
            if !tail.is_empty() {
                buffer.push_str(&tail);
                buffer.push(' ');
            }
        }

        buffer.push_str(sentence);
        buffer.push_str(". ");
        buffer_chars = buffer.chars().count();
    }

    let last = buffer.trim();
    if !last.is_empty() {
        chunks.push(last.to_string());
    }

    chunks
}

/// Chunk one document, attaching ordinal and sibling metadata.
pub fn chunk_document(
    text: &str,
    file_name: &str,
    year: &str,
    target_size: usize,
    overlap_size: usize,
) -> Vec<Chunk> {
    let pieces = chunk_text(text, target_size, overlap_size);
    let total = pieces.len();

    pieces
        .into_iter()
        .enumerate()
        .map(|(ordinal_index, text)| Chunk {
            text,
            ordinal_index,
            sibling_count: total,
            source_file_name: file_name.to_string(),
            source_year: year.to_string(),
        })
        .collect()
}
