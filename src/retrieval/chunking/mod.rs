#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::extract_keywords;
use crate::transcript::{Chunk, TranscriptSegment};

/// Number of keywords stored on each chunk
const CHUNK_KEYWORD_LIMIT: usize = 10;

/// A sentence boundary is only used when it falls in the last 30% of the buffer
const SENTENCE_CUT_MIN_RATIO: f64 = 0.7;

/// Floor for the forced split length
const MIN_FORCED_CHUNK_CHARS: usize = 16;

/// Configuration for transcript chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Close a chunk once adding the next segment would exceed this many characters
    pub target_chunk_chars: usize,
    /// Trailing characters of a closed chunk repeated at the start of the next one
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_chunk_chars: 1000,
            overlap_chars: 150,
        }
    }
}

/// Split an ordered transcript into overlapping timed chunks
///
/// Chunks are contiguous in time: every chunk ends where the next one starts, and
/// the last chunk ends at the end of the final segment. An empty transcript yields a
/// single empty chunk so callers always have something to anchor on.
#[inline]
pub fn chunk_transcript(segments: &[TranscriptSegment], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_start: Option<f64> = None;
    let mut last_end = 0.0_f64;

    for segment in segments {
        let text = segment.text.trim();
        if text.is_empty() {
            continue;
        }
        last_end = last_end.max(segment.end());

        let start = *buffer_start.get_or_insert(segment.start);
        let projected = buffer.chars().count() + 1 + text.chars().count();

        if !buffer.is_empty() && projected > config.target_chunk_chars {
            let (closed, remainder) = split_at_sentence(&buffer);
            let closed = closed.trim().to_string();
            let overlap = overlap_tail(&closed, config.overlap_chars);

            push_chunk(&mut chunks, start, segment.start, closed);

            let mut next = String::new();
            for piece in [overlap.as_str(), remainder.trim(), text] {
                if piece.is_empty() {
                    continue;
                }
                if !next.is_empty() {
                    next.push(' ');
                }
                next.push_str(piece);
            }
            buffer = next;
            buffer_start = Some(segment.start);
        } else {
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(text);
        }

        // A single segment can be longer than the target
        while buffer.chars().count() > forced_limit(config) {
            let start = buffer_start.unwrap_or(segment.start);
            let (closed, rest) = force_split(&buffer, forced_limit(config));
            let total = buffer.chars().count() as f64;
            let cut = start
                + (segment.end() - start).max(0.0) * (closed.chars().count() as f64 / total);
            let closed = closed.trim().to_string();
            let overlap = overlap_tail(&closed, forced_overlap(config));

            push_chunk(&mut chunks, start, cut, closed);

            buffer = if overlap.is_empty() {
                rest.trim_start().to_string()
            } else {
                format!("{} {}", overlap, rest.trim_start())
            };
            buffer_start = Some(cut);
        }
    }

    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        let start = buffer_start.unwrap_or(0.0);
        push_chunk(&mut chunks, start, last_end.max(start), trimmed.to_string());
    }

    if chunks.is_empty() {
        let start = segments.first().map_or(0.0, |s| s.start);
        chunks.push(Chunk {
            index: 0,
            start,
            end: start.max(last_end),
            text: String::new(),
            keywords: Vec::new(),
            embedding: None,
        });
    }

    debug!(
        "Chunked {} segments into {} chunks (avg {} chars)",
        segments.len(),
        chunks.len(),
        chunks.iter().map(|c| c.text.len()).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, start: f64, end: f64, text: String) {
    let keywords = extract_keywords(&text, CHUNK_KEYWORD_LIMIT);
    chunks.push(Chunk {
        index: chunks.len(),
        start,
        end,
        text,
        keywords,
        embedding: None,
    });
}

/// Split the buffer after its last sentence boundary when that boundary is late enough
fn split_at_sentence(buffer: &str) -> (&str, &str) {
    let boundary = [". ", "! ", "? "]
        .iter()
        .filter_map(|marker| buffer.rfind(marker))
        .max();

    match boundary {
        Some(position) if position as f64 > buffer.len() as f64 * SENTENCE_CUT_MIN_RATIO => {
            // Keep the punctuation in the closed chunk
            buffer.split_at(position + 1)
        }
        _ => (buffer, ""),
    }
}

/// Upper bound on chunk length, never small enough to stall the forced split
fn forced_limit(config: &ChunkingConfig) -> usize {
    config.target_chunk_chars.max(MIN_FORCED_CHUNK_CHARS)
}

/// Overlap carried across a forced split, capped so every split makes progress
fn forced_overlap(config: &ChunkingConfig) -> usize {
    config.overlap_chars.min(forced_limit(config) / 4)
}

/// Cut an oversized buffer at `limit` characters, or earlier at a late sentence boundary
fn force_split(buffer: &str, limit: usize) -> (&str, &str) {
    let at = buffer
        .char_indices()
        .nth(limit)
        .map_or(buffer.len(), |(index, _)| index);
    let (head, _) = buffer.split_at(at);
    let (closed, _) = split_at_sentence(head);
    buffer.split_at(closed.len())
}

/// The last `overlap_chars` characters of `text`
fn overlap_tail(text: &str, overlap_chars: usize) -> String {
    if overlap_chars == 0 {
        return String::new();
    }
    let total = text.chars().count();
    text.chars()
        .skip(total.saturating_sub(overlap_chars))
        .collect::<String>()
        .trim()
        .to_string()
}
