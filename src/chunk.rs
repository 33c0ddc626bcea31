//! Paragraph-boundary text chunker.
//!
//! Splits each page of a document into [`Chunk`]s that respect a
//! `max_tokens` limit. Splitting happens on paragraph boundaries (`\n\n`)
//! first; a paragraph longer than the limit is hard-split at the nearest
//! newline or space. Chunk indices are contiguous across the whole document.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, DocumentUnit};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Chunk every unit, numbering chunks from 0 across units in page order.
pub fn chunk_units(units: &[DocumentUnit], max_tokens: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for unit in units {
        let start = chunks.len() as i64;
        chunks.extend(chunk_text(unit.page, start, &unit.text, max_tokens));
    }
    chunks
}

/// Split one page of text. Returns no chunks for blank text.
pub fn chunk_text(page: usize, first_index: i64, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut chunks = Vec::new();
    let mut current_buf = String::new();
    let mut chunk_index = first_index;

    let flush = |buf: &mut String, chunks: &mut Vec<Chunk>, index: &mut i64| {
        if !buf.is_empty() {
            chunks.push(make_chunk(page, *index, buf));
            *index += 1;
            buf.clear();
        }
    };

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars {
            flush(&mut current_buf, &mut chunks, &mut chunk_index);
        }

        if trimmed.len() > max_chars {
            for piece in hard_split(trimmed, max_chars) {
                chunks.push(make_chunk(page, chunk_index, piece));
                chunk_index += 1;
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    flush(&mut current_buf, &mut chunks, &mut chunk_index);
    chunks
}

/// Split at `max_chars` boundaries, backing off to the last newline or space
/// and never cutting inside a UTF-8 sequence.
fn hard_split(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            pieces.push(remaining.trim());
            break;
        }

        let mut split_at = max_chars;
        while !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        if split_at == 0 {
            // A single character wider than the limit.
            split_at = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }

        let window = &remaining[..split_at];
        let actual_split = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&pos| pos > 0)
            .map(|pos| pos + 1)
            .unwrap_or(split_at);

        let piece = remaining[..actual_split].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        remaining = &remaining[actual_split..];
    }

    pieces.retain(|p| !p.is_empty());
    pieces
}

fn make_chunk(page: usize, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        page,
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
