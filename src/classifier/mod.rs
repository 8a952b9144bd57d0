// Query classifier
// Maps a user question onto a query type and the retrieval hints the router needs


use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use fancy_regex::Regex;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum number of prioritized key terms
const MAX_PRIORITY_TERMS: usize = 5;
const MAX_KEYWORDS: usize = 10;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect("valid regex"));
    };
}

pattern!(EXPLICIT_TIMESTAMP, r"(\d{1,3}):([0-5]\d)(?::([0-5]\d))?");
pattern!(MINUTE_MARKER, r"(?i)(\d+)\s*(?:minute|min)s?\s*(?:in|into|through)\b");
pattern!(
    DESCRIPTIVE_POSITION,
    r"(?i)\b(beginning|start|end|middle|first|last)\s+(?:of|part)\b"
);

pattern!(
    SUMMARY,
    r"(?i)summar|overview|recap|main\s+points?|key\s+(?:takeaways?|points?)|highlights?|what\s+(?:is|was|are|were)\s+(?:the|this)\s+(?:video|content|topic)|overall|in\s+general|basically|tl;?dr|too\s+long|\bbrief(?:ly)?\b|short\s+version"
);
pattern!(
    SPECIFIC,
    r"(?i)^\s*(?:what|when|where|who|why|how|which)\b|explain|describe|tell\s+me|talk\s+about|discuss|what\s+(?:is|are|does|do)\b|define|meaning\s+of|example|instance|such\s+as|like\s+what"
);
pattern!(
    COMPARISON,
    r"(?i)compar|versus|\bvs\b\.?|differ|between|contrast|similar|\bsame\b|alike|in\s+common|better|worse|\bbest\b|worst|advantage|disadvantage"
);
pattern!(
    LIST,
    r"(?i)\blist|enumerate|name\s+(?:all|every)|what\s+are\s+(?:all|the)\b|how\s+many|\bcount|number\s+of|\bsteps?\b|process|procedure|instructions?"
);
pattern!(
    GLOBAL,
    r"(?i)(?:whole|entire|complete|full)\s+video|\b(?:everything|all|overall|general)\b|from\s+start\s+to\s+(?:end|finish)|(?:throughout|across|during)\s+(?:the\s+)?video"
);
pattern!(
    DETAIL,
    r"(?i)(?:explain|describe)\s+(?:in\s+detail|thoroughly|comprehensively)|how\s+(?:exactly|specifically)|step[\s-]by[\s-]step|(?:all|every|each|complete|full)\s+(?:details?|aspects?|parts?)|(?:deep|thorough|comprehensive|detailed)\s+(?:explanation|analysis)"
);
pattern!(CONJUNCTION, r"(?i)\b(?:and|also|additionally|furthermore|moreover)\b");
pattern!(CONDITIONAL, r"(?i)\b(?:if|assuming|suppose|whether|depends)\b");
pattern!(QUOTED, r#""([^"]+)""#);
pattern!(
    NOUN_PHRASE,
    r"(?i)\b\w+\s+(?:learning|network|model|system|algorithm|method|approach|technique|data|information|knowledge|concept|idea|theory|principle)\b|\b(?:machine|deep|artificial|neural)\s+\w+"
);

static KEY_TERM_STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "is", "at", "which", "on", "a", "an", "and", "or", "but", "in", "with", "to",
        "for", "of", "as", "by", "that", "this", "it", "from", "be", "are", "been", "being",
        "have", "has", "had", "do", "does", "did", "will", "would", "should", "could", "may",
        "might", "must", "can", "i", "you", "he", "she", "we", "they", "what", "when", "where",
        "who", "why", "how", "video", "tell", "me",
    ]
    .into_iter()
    .collect()
});

static TECHNICAL_TERMS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "algorithm", "model", "neural", "network", "learning", "training", "data", "feature",
        "optimization", "gradient", "function", "parameter", "architecture", "layer", "tensor",
        "vector", "matrix", "dimension",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Timestamp,
    Summary,
    Specific,
    Comparison,
    List,
    General,
}

impl QueryType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Summary => "summary",
            Self::Specific => "specific",
            Self::Comparison => "comparison",
            Self::List => "list",
            Self::General => "general",
        }
    }

    fn confidence(self) -> f64 {
        match self {
            Self::Timestamp => 0.9,
            Self::Summary => 0.85,
            Self::Specific => 0.75,
            Self::Comparison | Self::List => 0.8,
            Self::General => 0.5,
        }
    }
}

impl fmt::Display for QueryType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    fn from_points(points: u32) -> Self {
        match points {
            0..=1 => Self::Low,
            2..=3 => Self::Medium,
            _ => Self::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    HasTimestamp,
    WantsOverview,
    TargetedSearch,
    NeedsMultiplePoints,
    WantsEnumeration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampKind {
    /// `MM:SS` or `H:MM:SS`
    Explicit,
    /// "5 minutes in"
    Minutes,
    /// "beginning of", "middle part", ...
    Descriptive,
}

/// Coarse position in the video named without a clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoPosition {
    Start,
    Middle,
    End,
}

impl VideoPosition {
    /// Fraction of the video duration this position points at
    #[inline]
    pub fn fraction(self) -> f64 {
        match self {
            Self::Start => 0.0,
            Self::Middle => 0.5,
            Self::End => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampHint {
    pub kind: TimestampKind,
    /// The text that was recognized
    pub formatted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<VideoPosition>,
}

impl TimestampHint {
    /// Target second in a video of `duration_seconds`
    #[inline]
    pub fn resolve(&self, duration_seconds: f64) -> Option<f64> {
        self.total_seconds
            .or_else(|| self.position.map(|p| p.fraction() * duration_seconds.max(0.0)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTerms {
    pub quoted: Vec<String>,
    pub keywords: Vec<String>,
    pub phrases: Vec<String>,
    /// Quoted phrases and keywords, technical vocabulary first, then longest first
    pub priority: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_terms: Option<KeyTerms>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryClassification {
    pub query_type: QueryType,
    pub confidence: f64,
    pub features: Vec<Feature>,
    pub hints: QueryHints,
    pub complexity: Complexity,
    pub needs_detail: bool,
    pub is_global: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    TimestampWindow,
    DistributedSampling,
    SemanticSearch,
    MultiPointSearch,
    ComprehensiveSearch,
    BalancedSearch,
}

/// Suggested retrieval shape for a classified query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPlan {
    pub method: RetrievalMethod,
    pub chunk_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f64>,
    /// Widen the search beyond the top hits
    pub expand: bool,
}

fn is_match(pattern: &Regex, text: &str) -> bool {
    pattern.is_match(text).unwrap_or(false)
}

/// Classify a query; never fails and always returns the same result for the same input
#[inline]
pub fn classify(query: &str) -> QueryClassification {
    let lowered = query.trim().to_lowercase();
    let mut hints = QueryHints::default();
    let mut features = Vec::new();

    let query_type = if let Some(timestamp) = extract_timestamp(query) {
        features.push(Feature::HasTimestamp);
        hints.timestamp = Some(timestamp);
        QueryType::Timestamp
    } else if is_match(&SUMMARY, &lowered) {
        features.push(Feature::WantsOverview);
        QueryType::Summary
    } else if is_match(&SPECIFIC, &lowered) {
        features.push(Feature::TargetedSearch);
        hints.key_terms = Some(extract_key_terms(&lowered));
        QueryType::Specific
    } else if is_match(&COMPARISON, &lowered) {
        features.push(Feature::NeedsMultiplePoints);
        QueryType::Comparison
    } else if is_match(&LIST, &lowered) {
        features.push(Feature::WantsEnumeration);
        QueryType::List
    } else {
        QueryType::General
    };

    let complexity = assess_complexity(query, query_type);
    let needs_detail = is_match(&DETAIL, query)
        || complexity == Complexity::High
        || matches!(query_type, QueryType::List | QueryType::Comparison);
    let is_global = is_match(&GLOBAL, &lowered);

    debug!(
        "Classified query as {} (complexity {:?}, detail {}, global {})",
        query_type, complexity, needs_detail, is_global
    );

    QueryClassification {
        query_type,
        confidence: query_type.confidence(),
        features,
        hints,
        complexity,
        needs_detail,
        is_global,
    }
}

/// Recognize a clock time, a minute marker or a descriptive position, in that order
#[inline]
pub fn extract_timestamp(query: &str) -> Option<TimestampHint> {
    if let Ok(Some(captures)) = EXPLICIT_TIMESTAMP.captures(query) {
        let first: u64 = captures.get(1)?.as_str().parse().ok()?;
        let second: u64 = captures.get(2)?.as_str().parse().ok()?;
        let total = match captures.get(3).and_then(|m| m.as_str().parse::<u64>().ok()) {
            Some(third) => first * 3600 + second * 60 + third,
            None => first * 60 + second,
        };

        return Some(TimestampHint {
            kind: TimestampKind::Explicit,
            formatted: captures.get(0)?.as_str().to_string(),
            total_seconds: Some(total as f64),
            position: None,
        });
    }

    if let Ok(Some(captures)) = MINUTE_MARKER.captures(query) {
        let minutes: u64 = captures.get(1)?.as_str().parse().ok()?;
        return Some(TimestampHint {
            kind: TimestampKind::Minutes,
            formatted: captures.get(0)?.as_str().to_string(),
            total_seconds: Some(minutes.saturating_mul(60) as f64),
            position: None,
        });
    }

    if let Ok(Some(captures)) = DESCRIPTIVE_POSITION.captures(query) {
        let position = match captures.get(1)?.as_str().to_lowercase().as_str() {
            "beginning" | "start" | "first" => VideoPosition::Start,
            "end" | "last" => VideoPosition::End,
            _ => VideoPosition::Middle,
        };
        return Some(TimestampHint {
            kind: TimestampKind::Descriptive,
            formatted: captures.get(0)?.as_str().to_string(),
            total_seconds: None,
            position: Some(position),
        });
    }

    None
}

/// Search terms from a lowercased query: quoted phrases, keywords and noun phrases
#[inline]
pub fn extract_key_terms(query: &str) -> KeyTerms {
    let quoted: Vec<String> = QUOTED
        .captures_iter(query)
        .flatten()
        .filter_map(|captures| captures.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|phrase| !phrase.is_empty())
        .collect();

    let unquoted = QUOTED.replace_all(query, " ");
    let cleaned: String = unquoted
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();

    let words: Vec<String> = cleaned
        .split_whitespace()
        .filter(|word| word.chars().count() > 2 && !KEY_TERM_STOP_WORDS.contains(word))
        .map(str::to_string)
        .collect();

    let phrases: Vec<String> = NOUN_PHRASE
        .find_iter(&cleaned)
        .flatten()
        .map(|m| m.as_str().to_string())
        .unique()
        .collect();

    let mut priority: Vec<String> = quoted.iter().chain(&words).cloned().unique().collect();
    // Stable: equally ranked terms keep query order
    priority.sort_by(|a, b| {
        let a_technical = TECHNICAL_TERMS.contains(a.as_str());
        let b_technical = TECHNICAL_TERMS.contains(b.as_str());
        b_technical
            .cmp(&a_technical)
            .then_with(|| b.chars().count().cmp(&a.chars().count()))
    });
    priority.truncate(MAX_PRIORITY_TERMS);

    KeyTerms {
        quoted,
        keywords: words.into_iter().unique().take(MAX_KEYWORDS).collect(),
        phrases,
        priority,
    }
}

fn assess_complexity(query: &str, query_type: QueryType) -> Complexity {
    let mut points = 0;

    let word_count = query.split_whitespace().count();
    if word_count > 20 {
        points += 2;
    } else if word_count > 10 {
        points += 1;
    }
    if query.matches('?').count() > 1 {
        points += 2;
    }
    if is_match(&CONJUNCTION, query) {
        points += 1;
    }
    if matches!(query_type, QueryType::Comparison | QueryType::List) {
        points += 1;
    }
    if is_match(&CONDITIONAL, query) {
        points += 1;
    }

    Complexity::from_points(points)
}

/// Suggested retrieval method and size for a classification
///
/// `video_minutes` only affects summaries, which sample more widely on long videos.
#[inline]
pub fn retrieval_plan(classification: &QueryClassification, video_minutes: u64) -> RetrievalPlan {
    let base = RetrievalPlan {
        method: RetrievalMethod::BalancedSearch,
        chunk_count: 5,
        window_seconds: None,
        score_threshold: None,
        expand: false,
    };

    match classification.query_type {
        QueryType::Timestamp => RetrievalPlan {
            method: RetrievalMethod::TimestampWindow,
            chunk_count: 3,
            window_seconds: Some(120.0),
            ..base
        },
        QueryType::Summary => RetrievalPlan {
            method: RetrievalMethod::DistributedSampling,
            chunk_count: if video_minutes > 60 { 8 } else { 6 },
            ..base
        },
        QueryType::Specific => RetrievalPlan {
            method: RetrievalMethod::SemanticSearch,
            score_threshold: Some(0.7),
            expand: classification.needs_detail,
            ..base
        },
        QueryType::Comparison => RetrievalPlan {
            method: RetrievalMethod::MultiPointSearch,
            chunk_count: 6,
            ..base
        },
        QueryType::List => RetrievalPlan {
            method: RetrievalMethod::ComprehensiveSearch,
            chunk_count: 8,
            ..base
        },
        QueryType::General => base,
    }
}
