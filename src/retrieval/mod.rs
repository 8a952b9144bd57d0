// Retrieval module
// Chunking, relevance scoring and the selection helpers shared by the router

pub mod chunking;
pub mod embedding;
pub mod keyword;


use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::transcript::{Chunk, estimate_tokens};

pub use chunking::{ChunkingConfig, chunk_transcript};
pub use embedding::{EmbeddingIndex, EmbeddingScorer, Embedder, HashEmbedder, IndexStats};
pub use keyword::KeywordScorer;

/// Words that carry no retrieval signal
pub static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "is", "at", "which", "on", "a", "an", "and", "or", "but", "in", "with", "to",
        "for", "of", "as", "by", "that", "this", "it", "from", "be", "are", "been", "being",
        "have", "has", "had", "do", "does", "did", "will", "would", "should", "could", "may",
        "might", "must", "can", "i", "you", "he", "she", "we", "they", "them", "their", "what",
        "so", "up", "out", "if", "about", "who", "get", "go", "me", "when", "make", "like",
        "time", "no", "just", "him", "know", "take", "into", "year", "your", "good", "some",
        "see", "other", "than", "then", "now", "look", "only", "come", "its", "over", "think",
        "also", "how", "why", "where", "there", "here", "all", "any", "was", "were", "not",
    ]
    .into_iter()
    .collect()
});

/// Lowercase alphanumeric terms longer than two characters, stop words removed
#[inline]
pub fn significant_terms(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 2 && !STOP_WORDS.contains(word))
        .map(str::to_string)
        .collect()
}

/// Most frequent significant terms, ties broken by first occurrence
#[inline]
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, word) in significant_terms(text).into_iter().enumerate() {
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.truncate(limit);

    ranked.into_iter().map(|(word, _, _)| word).collect()
}

/// A chunk paired with its relevance for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    /// Relevance normalized to 0.0 - 1.0
    pub score: f64,
}

impl RankedChunk {
    #[inline]
    pub fn new(chunk: Chunk, score: f64) -> Self {
        Self { chunk, score }
    }

    /// Wrap a chunk selected without a relevance signal
    #[inline]
    pub fn unscored(chunk: Chunk) -> Self {
        Self { chunk, score: 0.0 }
    }
}

/// Caller hints passed to a scorer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreOptions {
    /// Favor chunks near the end of the video
    pub prefer_recent: bool,
}

/// Ranks chunks against a query
pub trait RelevanceScorer {
    /// Chunks that clear the scorer's relevance bar, most relevant first
    fn score(&self, query: &str, chunks: &[Chunk], options: ScoreOptions) -> Vec<RankedChunk>;
}

/// Backfill `ranked` to `max_chunks` by sampling `all` at a fixed stride
///
/// When the ranked set already fills the quota it is truncated and keeps its
/// relevance order. Otherwise sampled chunks are added (with a zero score) so the
/// selection spans the whole video, and the result is sorted by start time.
#[inline]
pub fn distribute_evenly(
    mut ranked: Vec<RankedChunk>,
    all: &[Chunk],
    max_chunks: usize,
) -> Vec<RankedChunk> {
    if ranked.len() >= max_chunks {
        ranked.truncate(max_chunks);
        return ranked;
    }

    let stride = (all.len() / max_chunks.max(1)).max(1);
    let mut seen: HashSet<usize> = ranked.iter().map(|r| r.chunk.index).collect();

    for chunk in all.iter().step_by(stride) {
        if ranked.len() >= max_chunks {
            break;
        }
        if seen.insert(chunk.index) {
            ranked.push(RankedChunk::unscored(chunk.clone()));
        }
    }

    ranked.sort_by(|a, b| a.chunk.start.total_cmp(&b.chunk.start));
    ranked
}

/// Take chunks in order until the next one would exceed `max_tokens`
#[inline]
pub fn select_within_budget(ranked: Vec<RankedChunk>, max_tokens: usize) -> Vec<RankedChunk> {
    let mut selected = Vec::new();
    let mut used = 0;

    for candidate in ranked {
        let tokens = estimate_tokens(&candidate.chunk.text);
        if used + tokens > max_tokens {
            break;
        }
        used += tokens;
        selected.push(candidate);
    }

    selected
}

/// Chunks whose time range lies within `window` seconds of `target`, nearest first
#[inline]
pub fn timestamp_window(chunks: &[Chunk], target: f64, window: f64) -> Vec<RankedChunk> {
    let mut nearby: Vec<RankedChunk> = chunks
        .iter()
        .filter(|chunk| chunk.distance_to(target) <= window)
        .map(|chunk| {
            let closeness = if window > 0.0 {
                1.0 - (chunk.distance_to(target) / window).min(1.0)
            } else {
                1.0
            };
            RankedChunk::new(chunk.clone(), closeness)
        })
        .collect();

    nearby.sort_by(|a, b| {
        let a_dist = (a.chunk.midpoint() - target).abs();
        let b_dist = (b.chunk.midpoint() - target).abs();
        a_dist.total_cmp(&b_dist)
    });

    nearby
}
