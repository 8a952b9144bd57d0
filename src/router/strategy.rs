use std::fmt;

use serde::{Deserialize, Serialize};

use super::RoutingConfig;

/// Context-assembly policy chosen per video from its length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Whole transcript, cached
    DirectCache,
    /// Keyword/time/sampled chunks under a budget, cached when large
    SmartRag,
    /// Embedding-ranked chunks under a tighter budget, always cached per query
    AggressiveRagCache,
}

/// Display metadata for a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StrategyInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub cost_per_query: &'static str,
    pub expected_savings: &'static str,
}

/// Whole minutes in a duration given in seconds; negative and NaN count as zero
#[inline]
pub fn duration_minutes(duration_seconds: f64) -> u64 {
    if duration_seconds.is_finite() && duration_seconds > 0.0 {
        (duration_seconds / 60.0).floor() as u64
    } else {
        0
    }
}

impl Strategy {
    pub const ALL: [Self; 3] = [Self::DirectCache, Self::SmartRag, Self::AggressiveRagCache];

    /// Strategy for a video of `duration_seconds`; depends on duration alone
    #[inline]
    pub fn select(duration_seconds: f64, config: &RoutingConfig) -> Self {
        Self::for_minutes(duration_minutes(duration_seconds), config)
    }

    #[inline]
    pub fn for_minutes(minutes: u64, config: &RoutingConfig) -> Self {
        if minutes < config.direct_cache_max_minutes {
            Self::DirectCache
        } else if minutes < config.smart_rag_max_minutes {
            Self::SmartRag
        } else {
            Self::AggressiveRagCache
        }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectCache => "direct-cache",
            Self::SmartRag => "smart-rag",
            Self::AggressiveRagCache => "aggressive-rag-cache",
        }
    }

    #[inline]
    pub fn info(self) -> StrategyInfo {
        match self {
            Self::DirectCache => StrategyInfo {
                name: "Direct Caching",
                description: "Full transcript cached for fast responses",
                cost_per_query: "$0.001-0.002",
                expected_savings: "75-80%",
            },
            Self::SmartRag => StrategyInfo {
                name: "Smart RAG",
                description: "Intelligent chunk selection for relevance",
                cost_per_query: "$0.002-0.005",
                expected_savings: "85-90%",
            },
            Self::AggressiveRagCache => StrategyInfo {
                name: "Aggressive RAG + Cache",
                description: "Maximum optimization for long videos",
                cost_per_query: "$0.001-0.003",
                expected_savings: "94-98%",
            },
        }
    }

    #[inline]
    pub fn expected_savings_label(self) -> &'static str {
        self.info().expected_savings
    }

    /// Human-readable explanation of why this strategy fits `minutes`
    #[inline]
    pub fn reason(self, minutes: u64, config: &RoutingConfig) -> String {
        match self {
            Self::DirectCache => format!(
                "Video is short ({} min < {} min threshold)",
                minutes, config.direct_cache_max_minutes
            ),
            Self::SmartRag => format!(
                "Video is medium length ({} min <= {} min < {} min)",
                config.direct_cache_max_minutes, minutes, config.smart_rag_max_minutes
            ),
            Self::AggressiveRagCache => format!(
                "Video is long ({} min >= {} min threshold)",
                minutes, config.smart_rag_max_minutes
            ),
        }
    }
}

impl fmt::Display for Strategy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
