// Query router
// Picks a strategy per video and assembles a bounded, cache-aware prompt context per query

pub mod context;
pub mod shared;
pub mod strategy;


use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::classifier::{QueryClassification, QueryType, classify};
use crate::cost::{CostLedger, CostRecord, QueryUsage};
use crate::external::{Generation, LanguageModel, ModelOptions};
use crate::retrieval::{
    ChunkingConfig, EmbeddingIndex, Embedder, KeywordScorer, RankedChunk, RelevanceScorer,
    ScoreOptions, chunk_transcript, distribute_evenly, select_within_budget, timestamp_window,
};
use crate::transcript::{Chunk, TranscriptSegment, estimate_tokens, transcript_text};
use crate::{Result, RouterError};

pub use context::{
    ContextSource, ConversationMessage, DegradedReason, PromptContext, Role, RoutedQuery,
    format_chunks, format_transcript, query_hash, trim_history,
};
pub use shared::SharedRouter;
pub use strategy::{Strategy, StrategyInfo, duration_minutes};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Videos shorter than this many minutes use direct-cache
    pub direct_cache_max_minutes: u64,
    /// Videos shorter than this many minutes (and not direct) use smart-rag
    pub smart_rag_max_minutes: u64,
    pub smart_rag_budget_tokens: usize,
    pub aggressive_budget_tokens: usize,
    /// History kept per strategy, in exchanges of two messages
    pub direct_history_turns: usize,
    pub smart_rag_history_turns: usize,
    pub aggressive_history_turns: usize,
    /// Smart-rag selections larger than this are cached
    pub chunk_cache_trigger_tokens: usize,
    pub summary_sample_chunks: usize,
    pub timestamp_window_seconds: f64,
    pub max_chunks: usize,
    /// Chunk quota for queries that need detail
    pub detailed_max_chunks: usize,
    pub min_similarity: f32,
    pub system_prompt_tokens: usize,
    /// Output estimate used when the caller does not report one
    pub default_output_tokens: usize,
}

impl Default for RoutingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            direct_cache_max_minutes: 30,
            smart_rag_max_minutes: 180,
            smart_rag_budget_tokens: 4000,
            aggressive_budget_tokens: 3000,
            direct_history_turns: 10,
            smart_rag_history_turns: 6,
            aggressive_history_turns: 4,
            chunk_cache_trigger_tokens: 2000,
            summary_sample_chunks: 8,
            timestamp_window_seconds: 120.0,
            max_chunks: 5,
            detailed_max_chunks: 8,
            min_similarity: 0.5,
            system_prompt_tokens: 500,
            default_output_tokens: 2000,
        }
    }
}

/// Collaborators shared by every router session
#[derive(Clone)]
pub struct RouterContext {
    pub config: RoutingConfig,
    pub chunking: ChunkingConfig,
    pub cache: Arc<CacheManager>,
    pub ledger: Arc<Mutex<CostLedger>>,
    pub embedder: Arc<dyn Embedder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeOutcome {
    /// Strategy the session runs; smart-rag when the embedding index failed
    pub strategy: Strategy,
    pub expected_savings_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<DegradedReason>,
}

/// Per-video state built by `initialize`
struct VideoSession {
    video_id: String,
    duration_seconds: f64,
    minutes: u64,
    strategy: Strategy,
    degraded: Option<DegradedReason>,
    transcript: String,
    transcript_tokens: usize,
    /// Direct-cache only: the transcript is small enough to cache whole
    cache_ready: bool,
    chunks: Vec<Chunk>,
    index: Option<EmbeddingIndex>,
}

impl VideoSession {
    fn outcome(&self) -> InitializeOutcome {
        InitializeOutcome {
            strategy: self.strategy,
            expected_savings_label: self.strategy.expected_savings_label().to_string(),
            degraded: self.degraded,
        }
    }
}

/// What happened when a handler tried to put its content in the cache
enum CacheAttempt {
    Hit(String),
    Created(String),
    /// Too small to be worth caching, or caching not attempted
    Skipped,
    Failed,
}

impl CacheAttempt {
    fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    fn degraded(&self) -> Option<DegradedReason> {
        matches!(self, Self::Failed).then_some(DegradedReason::CacheUnavailable)
    }

    fn cache_id(self) -> Option<String> {
        match self {
            Self::Hit(id) | Self::Created(id) => Some(id),
            Self::Skipped | Self::Failed => None,
        }
    }
}

/// Handler output before the common token accounting
struct Assembled {
    source: ContextSource,
    /// Tokens of grounding billed at the fresh rate; zero on a cache hit
    content_tokens: usize,
    history: Vec<ConversationMessage>,
    cached: bool,
    chunk_count: Option<usize>,
    degraded: Option<DegradedReason>,
}

/// Routes queries about one video at a time
pub struct QueryRouter {
    context: RouterContext,
    session: Option<VideoSession>,
}

impl QueryRouter {
    #[inline]
    pub fn new(context: RouterContext) -> Self {
        Self {
            context,
            session: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &RoutingConfig {
        &self.context.config
    }

    #[inline]
    pub fn ledger(&self) -> &Arc<Mutex<CostLedger>> {
        &self.context.ledger
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Strategy of the loaded video
    #[inline]
    pub fn strategy(&self) -> Option<Strategy> {
        self.session.as_ref().map(|session| session.strategy)
    }

    /// Chunks prepared for the loaded video; empty for direct-cache
    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        self.session
            .as_ref()
            .map(|session| session.chunks.as_slice())
            .unwrap_or_default()
    }

    /// Load a video, select its strategy and preprocess the transcript
    ///
    /// Calling this again with the same video id and duration is a no-op.
    #[inline]
    pub fn initialize(
        &mut self,
        video_id: &str,
        segments: &[TranscriptSegment],
        duration_seconds: f64,
    ) -> InitializeOutcome {
        if let Some(session) = &self.session {
            if session.video_id == video_id
                && session.duration_seconds.to_bits() == duration_seconds.to_bits()
            {
                debug!("Video {} already initialized", video_id);
                return session.outcome();
            }
        }

        let config = &self.context.config;
        let minutes = duration_minutes(duration_seconds);
        let selected = Strategy::for_minutes(minutes, config);
        let transcript = transcript_text(segments);
        let transcript_tokens = estimate_tokens(&transcript);

        info!(
            "Initializing video {}: {} min, {} segments, {} tokens",
            video_id,
            minutes,
            segments.len(),
            transcript_tokens
        );
        info!(
            "Selected {} strategy: {}",
            selected,
            selected.reason(minutes, config)
        );

        let mut session = VideoSession {
            video_id: video_id.to_string(),
            duration_seconds,
            minutes,
            strategy: selected,
            degraded: None,
            transcript,
            transcript_tokens,
            cache_ready: false,
            chunks: Vec::new(),
            index: None,
        };

        match selected {
            Strategy::DirectCache => {
                let limit = self.context.cache.config().max_content_tokens;
                session.cache_ready = transcript_tokens < limit;
                if session.cache_ready {
                    debug!("Transcript fits the cache ({} < {} tokens)", transcript_tokens, limit);
                } else {
                    warn!(
                        "Transcript too large to cache ({} tokens), it will be sent inline",
                        transcript_tokens
                    );
                }
            }
            Strategy::SmartRag => {
                session.chunks = chunk_transcript(segments, &self.context.chunking);
                debug!("Created {} chunks", session.chunks.len());
            }
            Strategy::AggressiveRagCache => {
                session.chunks = chunk_transcript(segments, &self.context.chunking);
                match EmbeddingIndex::build(session.chunks.clone(), Arc::clone(&self.context.embedder)) {
                    Ok(index) => {
                        let index = index.with_min_similarity(config.min_similarity);
                        debug!("Indexed {} chunks", index.stats().embedded_chunks);
                        session.index = Some(index);
                    }
                    Err(e) => {
                        warn!("Embedding index failed, falling back to smart-rag: {:#}", e);
                        session.strategy = Strategy::SmartRag;
                        session.degraded = Some(DegradedReason::IndexUnavailable);
                    }
                }
            }
        }

        let outcome = session.outcome();
        self.session = Some(session);
        outcome
    }

    /// Classify `query` and assemble its context under the session strategy
    #[inline]
    pub async fn process_query(
        &mut self,
        query: &str,
        history: &[ConversationMessage],
    ) -> Result<RoutedQuery> {
        let started = Instant::now();
        let session = self.session.as_ref().ok_or(RouterError::NotInitialized)?;
        let classification = classify(query);

        info!(
            "Routing {} query via {} for video {}",
            classification.query_type, session.strategy, session.video_id
        );

        let assembled = if session.transcript.trim().is_empty() {
            warn!("Video {} has no transcript, answering without grounding", session.video_id);
            Assembled {
                source: ContextSource::None,
                content_tokens: 0,
                history: trim_history(history, self.context.config.direct_history_turns, usize::MAX),
                cached: false,
                chunk_count: None,
                degraded: Some(DegradedReason::NoTranscript),
            }
        } else {
            match session.strategy {
                Strategy::DirectCache => self.direct_cache(session, history).await,
                Strategy::SmartRag => self.smart_rag(session, query, &classification, history).await,
                Strategy::AggressiveRagCache => {
                    self.aggressive_rag(session, query, &classification, history).await
                }
            }
        };

        let history_tokens: usize = assembled.history.iter().map(ConversationMessage::token_count).sum();
        let input_tokens = assembled.content_tokens
            + history_tokens
            + estimate_tokens(query)
            + self.context.config.system_prompt_tokens;

        let routed = RoutedQuery {
            context: PromptContext {
                query: query.to_string(),
                source: assembled.source,
                history: assembled.history,
            },
            input_tokens,
            cached: assembled.cached,
            chunk_count: assembled.chunk_count,
            strategy: session.strategy,
            video_length_minutes: session.minutes,
            processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            classification,
            degraded: assembled.degraded.or(session.degraded),
        };

        info!(
            "Context ready: {} input tokens, cached {}, {} chunks",
            routed.input_tokens,
            routed.cached,
            routed.chunk_count.unwrap_or(0)
        );
        Ok(routed)
    }

    /// Record a finished query in the cost ledger
    ///
    /// `output_tokens` falls back to the configured estimate. Queries that are
    /// routed but never completed leave the ledger untouched.
    #[inline]
    pub async fn complete(
        &self,
        routed: &RoutedQuery,
        output_tokens: Option<usize>,
    ) -> Result<CostRecord> {
        let usage = QueryUsage {
            strategy: routed.strategy,
            input_tokens: routed.input_tokens,
            output_tokens: output_tokens.unwrap_or(self.context.config.default_output_tokens),
            cached: routed.cached,
            video_length_minutes: routed.video_length_minutes,
            processing_time_ms: routed.processing_time_ms,
        };

        let mut ledger = self.context.ledger.lock().await;
        ledger
            .record(&usage)
            .await
            .map_err(|e| RouterError::Storage(format!("{:#}", e)))
    }

    /// Route `query`, ask `model`, and record the cost using the reported output size
    ///
    /// A failed generation is returned as an error and nothing is recorded.
    #[inline]
    pub async fn answer(
        &mut self,
        model: &dyn LanguageModel,
        options: &ModelOptions,
        query: &str,
        history: &[ConversationMessage],
    ) -> Result<(RoutedQuery, Generation, CostRecord)> {
        let routed = self.process_query(query, history).await?;
        let generation = model
            .generate(&routed.context, options)
            .await
            .context("Model generation failed")?;
        let record = self.complete(&routed, Some(generation.output_tokens)).await?;
        Ok((routed, generation, record))
    }

    #[inline]
    pub fn strategy_info(&self) -> Option<StrategyInfo> {
        self.strategy().map(Strategy::info)
    }

    #[inline]
    pub fn strategy_reason(&self) -> Option<String> {
        self.session
            .as_ref()
            .map(|session| session.strategy.reason(session.minutes, &self.context.config))
    }

    async fn direct_cache(
        &self,
        session: &VideoSession,
        history: &[ConversationMessage],
    ) -> Assembled {
        let history = trim_history(history, self.context.config.direct_history_turns, usize::MAX);

        let attempt = if session.cache_ready {
            let content = format_transcript(&session.transcript);
            let ttl = self.context.cache.config().direct_ttl_seconds;
            self.try_cache(&session.video_id, content, ttl).await
        } else {
            CacheAttempt::Skipped
        };

        let cached = attempt.is_hit();
        let degraded = attempt.degraded();
        let (source, content_tokens) = match attempt.cache_id() {
            Some(cache_id) => (
                ContextSource::Cache { cache_id },
                if cached { 0 } else { session.transcript_tokens },
            ),
            None => (
                ContextSource::Transcript {
                    text: session.transcript.clone(),
                },
                session.transcript_tokens,
            ),
        };

        Assembled {
            source,
            content_tokens,
            history,
            cached,
            chunk_count: None,
            degraded,
        }
    }

    async fn smart_rag(
        &self,
        session: &VideoSession,
        query: &str,
        classification: &QueryClassification,
        history: &[ConversationMessage],
    ) -> Assembled {
        let config = &self.context.config;
        let (history, chunk_budget) = budget_history(
            history,
            config.smart_rag_history_turns,
            config.smart_rag_budget_tokens,
            query,
        );

        let candidates = match classification.query_type {
            QueryType::Timestamp => {
                let target = classification
                    .hints
                    .timestamp
                    .as_ref()
                    .and_then(|hint| hint.resolve(session.duration_seconds));
                let nearby = target
                    .map(|seconds| {
                        timestamp_window(&session.chunks, seconds, config.timestamp_window_seconds)
                    })
                    .unwrap_or_default();

                if nearby.is_empty() {
                    debug!("No chunks near the requested time, using keyword search");
                    self.keyword_candidates(session, query)
                } else {
                    debug!("Found {} chunks near {:?}s", nearby.len(), target);
                    nearby
                }
            }
            QueryType::Summary => {
                distribute_evenly(Vec::new(), &session.chunks, config.summary_sample_chunks)
            }
            _ => self.keyword_candidates(session, query),
        };

        let (selected, formatted) =
            fit_formatted(select_within_budget(candidates, chunk_budget), chunk_budget);
        let selected_tokens = estimate_tokens(&formatted);
        debug!(
            "Selected {} chunks ({} tokens of {} budget)",
            selected.len(),
            selected_tokens,
            chunk_budget
        );

        let wants_cache = !selected.is_empty()
            && (classification.query_type == QueryType::Summary
                || selected_tokens > config.chunk_cache_trigger_tokens);
        let attempt = if wants_cache {
            let key = smart_rag_cache_key(&session.video_id, classification.query_type, &selected);
            let ttl = self.context.cache.config().chunk_ttl_seconds;
            self.try_cache(&key, formatted, ttl).await
        } else {
            CacheAttempt::Skipped
        };

        assemble_chunks(selected, selected_tokens, history, attempt)
    }

    async fn aggressive_rag(
        &self,
        session: &VideoSession,
        query: &str,
        classification: &QueryClassification,
        history: &[ConversationMessage],
    ) -> Assembled {
        let config = &self.context.config;
        let (history, chunk_budget) = budget_history(
            history,
            config.aggressive_history_turns,
            config.aggressive_budget_tokens,
            query,
        );

        let max_chunks = if classification.needs_detail {
            config.detailed_max_chunks
        } else {
            config.max_chunks
        };
        let candidates = session
            .index
            .as_ref()
            .map(|index| index.search(query, max_chunks, ScoreOptions::default()))
            .unwrap_or_default();

        let (selected, formatted) =
            fit_formatted(select_within_budget(candidates, chunk_budget), chunk_budget);
        let selected_tokens = estimate_tokens(&formatted);
        debug!(
            "Selected {} of at most {} chunks ({} tokens of {} budget)",
            selected.len(),
            max_chunks,
            selected_tokens,
            chunk_budget
        );

        let attempt = if selected.is_empty() {
            CacheAttempt::Skipped
        } else {
            let key = format!("{}_{}", session.video_id, query_hash(query));
            let ttl = self.context.cache.config().query_ttl_seconds;
            self.try_cache(&key, formatted, ttl).await
        };

        assemble_chunks(selected, selected_tokens, history, attempt)
    }

    fn keyword_candidates(&self, session: &VideoSession, query: &str) -> Vec<RankedChunk> {
        let scored = KeywordScorer::new().score(query, &session.chunks, ScoreOptions::default());
        if scored.is_empty() {
            debug!("No keyword matches, sampling across the video");
            distribute_evenly(scored, &session.chunks, self.context.config.max_chunks)
        } else {
            scored
        }
    }

    async fn try_cache(&self, key: &str, content: String, ttl_seconds: u64) -> CacheAttempt {
        let content_tokens = estimate_tokens(&content);
        match self.context.cache.get_or_create(key, move || content, ttl_seconds).await {
            Ok(Some(handle)) if handle.reused => CacheAttempt::Hit(handle.cache_id),
            Ok(Some(handle)) => CacheAttempt::Created(handle.cache_id),
            Ok(None) if content_tokens < self.context.cache.config().min_tokens => {
                CacheAttempt::Skipped
            }
            Ok(None) => CacheAttempt::Failed,
            Err(e) => {
                warn!("Cache unavailable for {}, sending content inline: {:#}", key, e);
                CacheAttempt::Failed
            }
        }
    }
}

/// History that fits alongside the query, and the budget left for chunks
///
/// History never takes the room needed for the chunk header, so the formatted
/// grounding always has space for at least its header.
fn budget_history(
    history: &[ConversationMessage],
    max_turns: usize,
    budget: usize,
    query: &str,
) -> (Vec<ConversationMessage>, usize) {
    let available = budget.saturating_sub(estimate_tokens(query));
    let header_tokens = estimate_tokens(&format_chunks(&[]));
    let trimmed = trim_history(history, max_turns, available.saturating_sub(header_tokens));
    let history_tokens: usize = trimmed.iter().map(ConversationMessage::token_count).sum();
    (trimmed, available.saturating_sub(history_tokens))
}

/// Drop the lowest-priority chunks until the formatted grounding fits `budget`
///
/// Selection works on raw chunk text; the header and timestamp prefixes are
/// billed too, so the formatted text is what has to fit.
fn fit_formatted(mut selected: Vec<RankedChunk>, budget: usize) -> (Vec<RankedChunk>, String) {
    loop {
        let formatted = format_chunks(&selected);
        if selected.is_empty() || estimate_tokens(&formatted) <= budget {
            return (selected, formatted);
        }
        selected.pop();
    }
}

/// Summaries share one cache per video; other selections are keyed by their chunks
fn smart_rag_cache_key(video_id: &str, query_type: QueryType, selected: &[RankedChunk]) -> String {
    if query_type == QueryType::Summary {
        return format!("{}_{}", video_id, query_type);
    }

    let indices: Vec<String> = selected
        .iter()
        .map(|ranked| ranked.chunk.index.to_string())
        .collect();
    format!("{}_{}_{}", video_id, query_type, indices.join("-"))
}

fn assemble_chunks(
    selected: Vec<RankedChunk>,
    selected_tokens: usize,
    history: Vec<ConversationMessage>,
    attempt: CacheAttempt,
) -> Assembled {
    let chunk_count = Some(selected.len());
    let cached = attempt.is_hit();
    let degraded = attempt.degraded();

    let (source, content_tokens) = match attempt.cache_id() {
        Some(cache_id) => (
            ContextSource::Cache { cache_id },
            if cached { 0 } else { selected_tokens },
        ),
        None => (ContextSource::Chunks { chunks: selected }, selected_tokens),
    };

    Assembled {
        source,
        content_tokens,
        history,
        cached,
        chunk_count,
        degraded,
    }
}
