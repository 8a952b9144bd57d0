use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{CostLedger, CostRecord, DailyAggregate, TokenTotals};
use crate::router::Strategy;

/// Queries shown in a session summary
const RECENT_QUERIES: usize = 5;
/// Sessions with a lower cached-token ratio get a caching recommendation
const MIN_CACHE_RATIO: f64 = 0.3;
/// Minimum session length before the cache ratio is judged
const MIN_QUERIES_FOR_CACHE_ADVICE: usize = 5;
/// Average input above this suggests retrieval instead of full transcripts
const LARGE_CONTEXT_TOKENS: f64 = 50_000.0;
/// Average savings per query under this suggests a more aggressive strategy
const LOW_SAVINGS_PER_QUERY: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub duration_seconds: i64,
    pub queries: usize,
    pub total_cost: f64,
    pub total_savings: f64,
    pub avg_cost_per_query: f64,
    pub tokens: TokenTotals,
    pub recent: Vec<CostRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifetimeSummary {
    pub total_queries: u64,
    pub total_cost: f64,
    pub total_savings: f64,
    pub avg_cost_per_query: f64,
    pub days_since_first_use: i64,
    pub avg_daily_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyEffectiveness {
    pub avg_cost: f64,
    pub avg_savings: f64,
    pub avg_savings_percent: f64,
    /// Share of all queries that used this strategy
    pub usage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub aggregate: DailyAggregate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Projections {
    pub daily: f64,
    pub weekly: f64,
    pub monthly: f64,
    pub yearly: f64,
    pub savings_monthly: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationKind {
    Strategy,
    Caching,
    Optimization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub message: String,
    pub priority: Priority,
}

/// Dollar amount with precision that suits its magnitude
#[inline]
pub fn format_cost(amount: f64) -> String {
    let magnitude = amount.abs();
    if magnitude < 0.01 {
        format!("${:.6}", amount)
    } else if magnitude < 1.0 {
        format!("${:.4}", amount)
    } else {
        format!("${:.2}", amount)
    }
}

fn average(total: f64, count: u64) -> f64 {
    if count == 0 { 0.0 } else { total / count as f64 }
}

impl CostLedger {
    #[inline]
    pub fn session_summary(&self) -> SessionSummary {
        let session = self.session();
        let queries = session.records.len();
        let recent_start = queries.saturating_sub(RECENT_QUERIES);

        SessionSummary {
            duration_seconds: (Utc::now() - session.started_at).num_seconds(),
            queries,
            total_cost: session.total_cost,
            total_savings: session.total_savings,
            avg_cost_per_query: average(session.total_cost, queries as u64),
            tokens: session.tokens,
            recent: session.records[recent_start..].to_vec(),
        }
    }

    #[inline]
    pub fn lifetime_summary(&self) -> LifetimeSummary {
        let history = self.history();
        let days = (Utc::now() - history.first_use).num_days();
        let avg_daily_cost = if days > 0 {
            history.total_cost / days as f64
        } else {
            history.total_cost
        };

        LifetimeSummary {
            total_queries: history.total_queries,
            total_cost: history.total_cost,
            total_savings: history.total_savings,
            avg_cost_per_query: average(history.total_cost, history.total_queries),
            days_since_first_use: days,
            avg_daily_cost,
        }
    }

    /// Averages per strategy, for strategies that have been used
    #[inline]
    pub fn strategy_effectiveness(&self) -> BTreeMap<Strategy, StrategyEffectiveness> {
        let history = self.history();

        history
            .strategies
            .iter()
            .filter(|(_, stats)| stats.queries > 0)
            .map(|(strategy, stats)| {
                let spend_without_optimization = stats.cost + stats.savings;
                let avg_savings_percent = if spend_without_optimization > 0.0 {
                    stats.savings / spend_without_optimization * 100.0
                } else {
                    0.0
                };

                (
                    *strategy,
                    StrategyEffectiveness {
                        avg_cost: average(stats.cost, stats.queries),
                        avg_savings: average(stats.savings, stats.queries),
                        avg_savings_percent,
                        usage_percent: average(stats.queries as f64 * 100.0, history.total_queries),
                    },
                )
            })
            .collect()
    }

    /// One entry per calendar day for the last `days` days, oldest first, zero-filled
    #[inline]
    pub fn trend(&self, days: u32) -> Vec<DailyTrend> {
        let today = Utc::now().date_naive();

        (0..days)
            .rev()
            .filter_map(|offset| today.checked_sub_days(Days::new(u64::from(offset))))
            .map(|date| DailyTrend {
                date,
                aggregate: self.history().daily.get(&date).copied().unwrap_or_default(),
            })
            .collect()
    }

    /// Spend extrapolated from the average per active day
    #[inline]
    pub fn projections(&self) -> Projections {
        let history = self.history();
        if history.total_queries == 0 {
            return Projections::default();
        }

        let active_days = history.daily.len().max(1) as f64;
        let queries_per_day = history.total_queries as f64 / active_days;
        let cost_per_query = average(history.total_cost, history.total_queries);
        let savings_per_query = average(history.total_savings, history.total_queries);
        let daily = queries_per_day * cost_per_query;

        Projections {
            daily,
            weekly: daily * 7.0,
            monthly: daily * 30.0,
            yearly: daily * 365.0,
            savings_monthly: savings_per_query * queries_per_day * 30.0,
        }
    }

    #[inline]
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();
        let session = self.session();

        let most_used = self
            .history()
            .strategies
            .values()
            .filter(|stats| stats.queries > 0)
            .max_by_key(|stats| stats.queries);
        if let Some(stats) = most_used {
            if average(stats.savings, stats.queries) < LOW_SAVINGS_PER_QUERY {
                recommendations.push(Recommendation {
                    kind: RecommendationKind::Strategy,
                    message: "Consider using more aggressive optimization for longer videos"
                        .to_string(),
                    priority: Priority::High,
                });
            }
        }

        let queries = session.records.len();
        let cache_ratio = session.tokens.cached as f64 / session.tokens.input.max(1) as f64;
        if queries >= MIN_QUERIES_FOR_CACHE_ADVICE && cache_ratio < MIN_CACHE_RATIO {
            recommendations.push(Recommendation {
                kind: RecommendationKind::Caching,
                message: "Enable context caching to save 75% on repeated queries".to_string(),
                priority: Priority::High,
            });
        }

        let avg_input = session.tokens.input as f64 / queries.max(1) as f64;
        if avg_input > LARGE_CONTEXT_TOKENS {
            recommendations.push(Recommendation {
                kind: RecommendationKind::Optimization,
                message: "Your queries use large contexts. RAG could reduce costs by 90%+"
                    .to_string(),
                priority: Priority::Critical,
            });
        }

        recommendations
    }

    /// Session records as CSV, one row per query
    #[inline]
    pub fn export_csv(&self) -> String {
        let mut csv = String::from(
            "Date,Time,Strategy,Video Length,Input Tokens,Output Tokens,Cached,Cost,Savings,Savings %\n",
        );

        for record in &self.session().records {
            let _ = writeln!(
                csv,
                "{},{},{},{}min,{},{},{},${:.6},${:.6},{:.1}%",
                record.timestamp.format("%Y-%m-%d"),
                record.timestamp.format("%H:%M:%S"),
                record.strategy,
                record.video_length_minutes,
                record.input_tokens,
                record.output_tokens,
                if record.cached_tokens > 0 { "Yes" } else { "No" },
                record.actual_cost,
                record.savings,
                record.savings_percent
            );
        }

        csv
    }
}
