#[cfg(test)]
mod tests;

use std::sync::LazyLock;

use fancy_regex::Regex;
use itertools::Itertools;
use tracing::debug;

use super::{RankedChunk, RelevanceScorer, ScoreOptions, significant_terms};
use crate::transcript::Chunk;

const EXACT_MATCH_POINTS: f64 = 10.0;
const CHUNK_KEYWORD_POINTS: f64 = 2.0;
const TEXT_KEYWORD_POINTS: f64 = 1.0;
const NEAR_TIMESTAMP_POINTS: f64 = 20.0;
const CLOSE_TIMESTAMP_POINTS: f64 = 10.0;
const NEAR_TIMESTAMP_SECONDS: f64 = 60.0;
const CLOSE_TIMESTAMP_SECONDS: f64 = 300.0;

static CLOCK_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2}):([0-5]\d)(?::([0-5]\d))?\b").expect("valid regex")
});

/// Seconds referenced by the first `MM:SS` (or `H:MM:SS`) in `text`
#[inline]
pub fn clock_reference(text: &str) -> Option<f64> {
    let captures = CLOCK_REFERENCE.captures(text).ok().flatten()?;
    let first: u64 = captures.get(1)?.as_str().parse().ok()?;
    let second: u64 = captures.get(2)?.as_str().parse().ok()?;

    let total = match captures.get(3) {
        Some(third) => {
            let third: u64 = third.as_str().parse().ok()?;
            first * 3600 + second * 60 + third
        }
        None => first * 60 + second,
    };
    Some(total as f64)
}

/// Keyword overlap scorer with exact-phrase and timestamp proximity bonuses
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordScorer;

impl KeywordScorer {
    #[inline]
    pub fn new() -> Self {
        Self
    }

    fn raw_score(
        query_lower: &str,
        keywords: &[String],
        time_reference: Option<f64>,
        chunk: &Chunk,
    ) -> f64 {
        let text = chunk.text.to_lowercase();
        let mut score = 0.0;

        if !query_lower.is_empty() && text.contains(query_lower) {
            score += EXACT_MATCH_POINTS;
        }

        for keyword in keywords {
            if chunk.keywords.iter().any(|k| k == keyword) {
                score += CHUNK_KEYWORD_POINTS;
            }
            if text.contains(keyword.as_str()) {
                score += TEXT_KEYWORD_POINTS;
            }
        }

        if let Some(seconds) = time_reference {
            let distance = chunk.distance_to(seconds);
            if distance < NEAR_TIMESTAMP_SECONDS {
                score += NEAR_TIMESTAMP_POINTS;
            } else if distance < CLOSE_TIMESTAMP_SECONDS {
                score += CLOSE_TIMESTAMP_POINTS;
            }
        }

        score
    }
}

impl RelevanceScorer for KeywordScorer {
    #[inline]
    fn score(&self, query: &str, chunks: &[Chunk], _options: ScoreOptions) -> Vec<RankedChunk> {
        let query_lower = query.trim().to_lowercase();
        let keywords: Vec<String> = significant_terms(query).into_iter().unique().collect();
        let time_reference = clock_reference(query);

        let max_points = EXACT_MATCH_POINTS
            + keywords.len() as f64 * (CHUNK_KEYWORD_POINTS + TEXT_KEYWORD_POINTS)
            + if time_reference.is_some() {
                NEAR_TIMESTAMP_POINTS
            } else {
                0.0
            };

        let mut ranked: Vec<(f64, RankedChunk)> = chunks
            .iter()
            .filter_map(|chunk| {
                let raw = Self::raw_score(&query_lower, &keywords, time_reference, chunk);
                (raw > 0.0).then(|| (raw, RankedChunk::new(chunk.clone(), raw / max_points)))
            })
            .collect();

        // Stable: equal scores keep transcript order
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        debug!(
            "Keyword scoring matched {}/{} chunks for keywords [{}]",
            ranked.len(),
            chunks.len(),
            keywords.iter().take(5).join(", ")
        );

        ranked.into_iter().map(|(_, chunk)| chunk).collect()
    }
}
