use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::Strategy;
use crate::classifier::QueryClassification;
use crate::retrieval::RankedChunk;
use crate::transcript::{estimate_tokens, format_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of the chat so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    #[inline]
    pub fn token_count(&self) -> usize {
        estimate_tokens(&self.content)
    }
}

/// Where the model gets its grounding from; exactly one source per query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextSource {
    /// Content already hosted by the model provider
    Cache { cache_id: String },
    /// Whole transcript sent inline
    Transcript { text: String },
    /// Selected chunks sent inline, in selection order
    Chunks { chunks: Vec<RankedChunk> },
    /// Nothing to ground on
    None,
}

/// Everything the caller needs to build the model request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    pub query: String,
    pub source: ContextSource,
    pub history: Vec<ConversationMessage>,
}

impl PromptContext {
    #[inline]
    pub fn cache_id(&self) -> Option<&str> {
        match &self.source {
            ContextSource::Cache { cache_id } => Some(cache_id),
            _ => None,
        }
    }

    /// Grounding text to send inline, formatted the same way as cached content
    #[inline]
    pub fn inline_text(&self) -> Option<String> {
        match &self.source {
            ContextSource::Transcript { text } => Some(format_transcript(text)),
            ContextSource::Chunks { chunks } => Some(format_chunks(chunks)),
            ContextSource::Cache { .. } | ContextSource::None => None,
        }
    }
}

/// Why a query was answered with less than its strategy's normal context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// Cache creation or registry persistence failed; content went inline
    CacheUnavailable,
    /// Embedding index could not be built; the session runs smart-rag
    IndexUnavailable,
    /// The video has no transcript text
    NoTranscript,
}

/// Result of routing one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedQuery {
    pub context: PromptContext,
    /// Estimated input tokens billed for this query, including the system prompt
    pub input_tokens: usize,
    /// The grounding was served from an existing cache
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    pub strategy: Strategy,
    pub video_length_minutes: u64,
    pub processing_time_ms: u64,
    pub classification: QueryClassification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<DegradedReason>,
}

/// Whole-transcript cache content
#[inline]
pub fn format_transcript(text: &str) -> String {
    format!("Video Transcript:\n\n{}", text)
}

/// Selected-chunk cache content, each chunk prefixed with its start time
#[inline]
pub fn format_chunks(chunks: &[RankedChunk]) -> String {
    let mut formatted = String::from("Relevant video segments:\n\n");
    for ranked in chunks {
        let _ = write!(
            formatted,
            "[{}] {}\n\n",
            format_timestamp(ranked.chunk.start),
            ranked.chunk.text
        );
    }
    formatted
}

/// Keep the last `max_turns` exchanges, then drop the oldest messages until the
/// rest fits in `token_limit`
#[inline]
pub fn trim_history(
    history: &[ConversationMessage],
    max_turns: usize,
    token_limit: usize,
) -> Vec<ConversationMessage> {
    let keep = max_turns.saturating_mul(2);
    let mut trimmed = &history[history.len().saturating_sub(keep)..];

    let mut tokens: usize = trimmed.iter().map(ConversationMessage::token_count).sum();
    while tokens > token_limit {
        let Some((oldest, rest)) = trimmed.split_first() else {
            break;
        };
        tokens -= oldest.token_count();
        trimmed = rest;
    }

    trimmed.to_vec()
}

/// Cache key suffix for a query: its first five words, lowercased and stripped of punctuation
#[inline]
pub fn query_hash(query: &str) -> String {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    cleaned.split_whitespace().take(5).collect::<Vec<_>>().join("_")
}
