#[cfg(test)]
mod tests;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use super::{RankedChunk, RelevanceScorer, ScoreOptions, distribute_evenly, significant_terms};
use crate::transcript::Chunk;

/// Dimensions of the hashed term-frequency vectors
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;
/// Similarity below which a chunk is not considered relevant
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.5;

const EXACT_MATCH_BOOST: f32 = 2.0;
const RECENT_BOOST: f32 = 1.2;
/// How many trailing chunks count as "recent"
const RECENT_WINDOW: usize = 10;
/// Largest similarity reachable after every boost, used to normalize scores
const MAX_BOOSTED_SIMILARITY: f32 = EXACT_MATCH_BOOST * RECENT_BOOST;

/// Produces fixed-length vectors for text
pub trait Embedder: Send + Sync {
    /// Short identifier for logs and stats
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic feature-hashing embedder used when no model is available
///
/// Each significant term is hashed into one of `dimensions` buckets and weighted
/// by term frequency; the vector is L2-normalized.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    #[inline]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashEmbedder {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl Embedder for HashEmbedder {
    #[inline]
    fn name(&self) -> &str {
        "hashed-tf"
    }

    #[inline]
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimensions];
        let terms = significant_terms(text);
        if terms.is_empty() {
            return Ok(vector);
        }

        let weight = 1.0 / terms.len() as f32;
        for term in &terms {
            let bucket = (fnv1a(term.as_bytes()) % self.dimensions as u64) as usize;
            vector[bucket] += weight;
        }

        normalize(&mut vector);
        Ok(vector)
    }
}

/// 64-bit FNV-1a, stable across platforms and releases
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes.iter().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Cosine similarity; 0.0 for mismatched or zero vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot = x.mul_add(*y, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Cosine-similarity scorer over chunk embeddings
#[derive(Clone)]
pub struct EmbeddingScorer {
    embedder: Arc<dyn Embedder>,
    min_similarity: f32,
}

impl EmbeddingScorer {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }

    #[inline]
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }
}

impl RelevanceScorer for EmbeddingScorer {
    #[inline]
    fn score(&self, query: &str, chunks: &[Chunk], options: ScoreOptions) -> Vec<RankedChunk> {
        let query_vector = match self.embedder.embed(query) {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Failed to embed query, no chunks scored: {:#}", e);
                return Vec::new();
            }
        };
        let query_lower = query.trim().to_lowercase();

        let mut ranked: Vec<(f32, RankedChunk)> = chunks
            .iter()
            .filter_map(|chunk| {
                let mut similarity = match &chunk.embedding {
                    Some(vector) => cosine_similarity(&query_vector, vector),
                    None => self
                        .embedder
                        .embed(&chunk.text)
                        .map(|vector| cosine_similarity(&query_vector, &vector))
                        .unwrap_or(0.0),
                };

                if options.prefer_recent && chunk.index + RECENT_WINDOW >= chunks.len() {
                    similarity *= RECENT_BOOST;
                }
                if !query_lower.is_empty() && chunk.text.to_lowercase().contains(&query_lower) {
                    similarity *= EXACT_MATCH_BOOST;
                }

                (similarity >= self.min_similarity).then(|| {
                    let normalized = (similarity / MAX_BOOSTED_SIMILARITY).min(1.0);
                    (
                        similarity,
                        RankedChunk::new(chunk.clone(), f64::from(normalized)),
                    )
                })
            })
            .collect();

        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked.into_iter().map(|(_, chunk)| chunk).collect()
    }
}

/// Memory and coverage figures for an embedding index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub embedded_chunks: usize,
    pub dimensions: usize,
    pub estimated_bytes: usize,
    pub method: String,
}

/// Precomputed chunk vectors for one video
#[derive(Clone)]
pub struct EmbeddingIndex {
    chunks: Vec<Chunk>,
    scorer: EmbeddingScorer,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingIndex {
    /// Embed every chunk; any failure aborts the build
    #[inline]
    pub fn build(mut chunks: Vec<Chunk>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dimensions = embedder.dimensions();

        for chunk in &mut chunks {
            let vector = embedder
                .embed(&chunk.text)
                .with_context(|| format!("Failed to embed chunk {}", chunk.index))?;
            if vector.len() != dimensions {
                bail!(
                    "Embedder {} returned {} dimensions for chunk {}, expected {}",
                    embedder.name(),
                    vector.len(),
                    chunk.index,
                    dimensions
                );
            }
            chunk.embedding = Some(vector);
        }

        info!(
            "Indexed {} chunks with {} embeddings ({} dimensions)",
            chunks.len(),
            embedder.name(),
            dimensions
        );

        Ok(Self {
            chunks,
            scorer: EmbeddingScorer::new(Arc::clone(&embedder)),
            embedder,
        })
    }

    #[inline]
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.scorer = self.scorer.with_min_similarity(min_similarity);
        self
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Relevant chunks for `query`, backfilled to `max_chunks` across the video
    #[inline]
    pub fn search(&self, query: &str, max_chunks: usize, options: ScoreOptions) -> Vec<RankedChunk> {
        let mut relevant = self.scorer.score(query, &self.chunks, options);
        relevant.truncate(max_chunks);
        debug!(
            "Embedding search found {} chunks above threshold (max {})",
            relevant.len(),
            max_chunks
        );

        distribute_evenly(relevant, &self.chunks, max_chunks)
    }

    #[inline]
    pub fn stats(&self) -> IndexStats {
        let embedded_chunks = self
            .chunks
            .iter()
            .filter(|chunk| chunk.embedding.is_some())
            .count();
        let dimensions = self.embedder.dimensions();

        IndexStats {
            total_chunks: self.chunks.len(),
            embedded_chunks,
            dimensions,
            estimated_bytes: embedded_chunks * dimensions * size_of::<f32>(),
            method: self.embedder.name().to_string(),
        }
    }
}
