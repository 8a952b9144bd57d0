// Cost ledger
// Prices each completed query, keeps the session log and durable daily/per-strategy aggregates

pub mod report;


use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::router::Strategy;
use crate::storage::{KeyValueStore, load_json, save_json};

pub use report::{
    DailyTrend, LifetimeSummary, Projections, Recommendation, RecommendationKind, Priority,
    SessionSummary, StrategyEffectiveness, format_cost,
};

/// Storage key of the lifetime aggregates
pub const HISTORY_KEY: &str = "cost_history";
/// Storage key of the current session log
pub const SESSION_KEY: &str = "cost_session";

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Model pricing, in dollars per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub input_per_million: f64,
    pub cached_input_per_million: f64,
    pub output_per_million: f64,
    /// Cache storage, per million tokens per hour
    pub storage_per_million_hour: f64,
    /// Transcript tokens per minute of video, used for the unoptimized baseline
    pub tokens_per_minute: u64,
}

impl Default for PricingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            input_per_million: 0.15,
            cached_input_per_million: 0.0375,
            output_per_million: 0.60,
            storage_per_million_hour: 1.00,
            tokens_per_minute: 500,
        }
    }
}

impl PricingConfig {
    #[inline]
    pub fn input_cost(&self, tokens: usize) -> f64 {
        tokens as f64 * self.input_per_million / TOKENS_PER_MILLION
    }

    #[inline]
    pub fn cached_input_cost(&self, tokens: usize) -> f64 {
        tokens as f64 * self.cached_input_per_million / TOKENS_PER_MILLION
    }

    #[inline]
    pub fn output_cost(&self, tokens: usize) -> f64 {
        tokens as f64 * self.output_per_million / TOKENS_PER_MILLION
    }
}

/// What the caller reports once a query has its model response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryUsage {
    pub strategy: Strategy,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub cached: bool,
    pub video_length_minutes: u64,
    pub processing_time_ms: u64,
}

/// One priced query; records are only ever appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub timestamp: DateTime<Utc>,
    pub strategy: Strategy,
    pub video_length_minutes: u64,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub cached_tokens: usize,
    pub actual_cost: f64,
    pub baseline_cost: f64,
    /// Negative when the optimization cost more than sending the whole transcript
    pub savings: f64,
    pub savings_percent: f64,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub input: usize,
    pub output: usize,
    pub cached: usize,
}

impl TokenTotals {
    fn add(&mut self, record: &CostRecord) {
        self.input += record.input_tokens;
        self.output += record.output_tokens;
        self.cached += record.cached_tokens;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub queries: u64,
    pub cost: f64,
    pub savings: f64,
    pub tokens: TokenTotals,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyAggregate {
    pub queries: u64,
    pub cost: f64,
    pub savings: f64,
}

/// Lifetime aggregates, persisted across restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerHistory {
    pub first_use: DateTime<Utc>,
    pub total_queries: u64,
    pub total_cost: f64,
    pub total_savings: f64,
    #[serde(default)]
    pub daily: BTreeMap<NaiveDate, DailyAggregate>,
    #[serde(default)]
    pub strategies: BTreeMap<Strategy, StrategyAggregate>,
}

impl LedgerHistory {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            first_use: now,
            total_queries: 0,
            total_cost: 0.0,
            total_savings: 0.0,
            daily: BTreeMap::new(),
            strategies: BTreeMap::new(),
        }
    }

    fn merge(&mut self, record: &CostRecord) {
        self.total_queries += 1;
        self.total_cost += record.actual_cost;
        self.total_savings += record.savings;

        let day = self.daily.entry(record.timestamp.date_naive()).or_default();
        day.queries += 1;
        day.cost += record.actual_cost;
        day.savings += record.savings;
        day.tokens.add(record);

        let strategy = self.strategies.entry(record.strategy).or_default();
        strategy.queries += 1;
        strategy.cost += record.actual_cost;
        strategy.savings += record.savings;
    }
}

/// Records of the current session, in completion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub started_at: DateTime<Utc>,
    pub records: Vec<CostRecord>,
    pub total_cost: f64,
    pub total_savings: f64,
    pub tokens: TokenTotals,
}

impl SessionLog {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            records: Vec::new(),
            total_cost: 0.0,
            total_savings: 0.0,
            tokens: TokenTotals::default(),
        }
    }

    fn append(&mut self, record: CostRecord) {
        self.total_cost += record.actual_cost;
        self.total_savings += record.savings;
        self.tokens.add(&record);
        self.records.push(record);
    }
}

/// Per-query cost accounting with durable aggregates
pub struct CostLedger {
    store: Arc<dyn KeyValueStore>,
    pricing: PricingConfig,
    history: LedgerHistory,
    session: SessionLog,
}

impl CostLedger {
    /// Restore the lifetime aggregates and any unfinished session
    #[inline]
    pub async fn load(store: Arc<dyn KeyValueStore>, pricing: PricingConfig) -> Result<Self> {
        let now = Utc::now();
        let history = load_json(store.as_ref(), HISTORY_KEY)
            .await
            .context("Failed to load cost history")?
            .unwrap_or_else(|| LedgerHistory::new(now));
        let session = load_json(store.as_ref(), SESSION_KEY)
            .await
            .context("Failed to load cost session")?
            .unwrap_or_else(|| SessionLog::new(now));

        debug!(
            "Loaded cost ledger: {} lifetime queries, {} in session",
            history.total_queries,
            session.records.len()
        );

        Ok(Self {
            store,
            pricing,
            history,
            session,
        })
    }

    #[inline]
    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    #[inline]
    pub fn history(&self) -> &LedgerHistory {
        &self.history
    }

    #[inline]
    pub fn session(&self) -> &SessionLog {
        &self.session
    }

    /// Price a query without recording it
    #[inline]
    pub fn price(&self, usage: &QueryUsage, timestamp: DateTime<Utc>) -> CostRecord {
        let output_cost = self.pricing.output_cost(usage.output_tokens);
        let input_cost = if usage.cached {
            self.pricing.cached_input_cost(usage.input_tokens)
        } else {
            self.pricing.input_cost(usage.input_tokens)
        };
        let actual_cost = input_cost + output_cost;

        let baseline_tokens = usage
            .video_length_minutes
            .saturating_mul(self.pricing.tokens_per_minute);
        let baseline_cost =
            self.pricing.input_cost(usize::try_from(baseline_tokens).unwrap_or(usize::MAX))
                + output_cost;

        let savings = baseline_cost - actual_cost;
        let savings_percent = if baseline_cost > 0.0 {
            savings / baseline_cost * 100.0
        } else {
            0.0
        };

        CostRecord {
            timestamp,
            strategy: usage.strategy,
            video_length_minutes: usage.video_length_minutes,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cached_tokens: if usage.cached { usage.input_tokens } else { 0 },
            actual_cost,
            baseline_cost,
            savings,
            savings_percent,
            processing_time_ms: usage.processing_time_ms,
        }
    }

    /// Price and append a completed query, then persist the aggregates
    #[inline]
    pub async fn record(&mut self, usage: &QueryUsage) -> Result<CostRecord> {
        let record = self.price(usage, Utc::now());

        let mut history = self.history.clone();
        history.merge(&record);
        let mut session = self.session.clone();
        session.append(record.clone());
        self.persist(&history, &session).await?;
        self.history = history;
        self.session = session;

        info!(
            "Recorded {} query: {} input ({}), {} output, cost {} saved {} ({:.1}%)",
            record.strategy,
            record.input_tokens,
            if usage.cached { "cached" } else { "fresh" },
            record.output_tokens,
            format_cost(record.actual_cost),
            format_cost(record.savings),
            record.savings_percent
        );
        Ok(record)
    }

    /// Start a new session, keeping lifetime aggregates
    #[inline]
    pub async fn clear_session(&mut self) -> Result<()> {
        self.session = SessionLog::new(Utc::now());
        self.store
            .remove(SESSION_KEY)
            .await
            .context("Failed to clear cost session")
    }

    /// Forget everything, including lifetime aggregates
    #[inline]
    pub async fn reset_all(&mut self) -> Result<()> {
        self.history = LedgerHistory::new(Utc::now());
        self.clear_session().await?;
        self.store
            .remove(HISTORY_KEY)
            .await
            .context("Failed to clear cost history")?;

        info!("Cost ledger reset");
        Ok(())
    }

    /// Write both documents; the in-memory ledger only changes after this succeeds
    async fn persist(&self, history: &LedgerHistory, session: &SessionLog) -> Result<()> {
        save_json(self.store.as_ref(), HISTORY_KEY, history)
            .await
            .context("Failed to persist cost history")?;
        save_json(self.store.as_ref(), SESSION_KEY, session)
            .await
            .context("Failed to persist cost session")
    }
}
