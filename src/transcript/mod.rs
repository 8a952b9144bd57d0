
use serde::{Deserialize, Serialize};

/// Characters per token used by the estimator
const CHARS_PER_TOKEN: usize = 4;

/// One timed caption line as delivered by the transcript source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Offset from the start of the video, in seconds
    pub start: f64,
    /// Length of the caption, in seconds
    #[serde(default)]
    pub duration: f64,
    pub text: String,
}

impl TranscriptSegment {
    #[inline]
    pub fn new(start: f64, duration: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            duration,
            text: text.into(),
        }
    }

    #[inline]
    pub fn end(&self) -> f64 {
        self.start + self.duration.max(0.0)
    }
}

/// A contiguous, timestamped slice of a transcript sized for retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Most frequent significant terms, most frequent first
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Distance in seconds between `seconds` and this chunk's time range (0 when inside)
    #[inline]
    pub fn distance_to(&self, seconds: f64) -> f64 {
        if seconds < self.start {
            self.start - seconds
        } else if seconds > self.end {
            seconds - self.end
        } else {
            0.0
        }
    }

    #[inline]
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }

    #[inline]
    pub fn token_count(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

/// Approximate the model's token count from character length
#[inline]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Sum of estimated tokens over every chunk's text
#[inline]
pub fn estimate_chunk_tokens(chunks: &[Chunk]) -> usize {
    chunks.iter().map(Chunk::token_count).sum()
}

/// Join all segment texts with single spaces
#[inline]
pub fn transcript_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|segment| segment.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Total duration covered by the transcript, in seconds
#[inline]
pub fn transcript_duration(segments: &[TranscriptSegment]) -> f64 {
    segments.iter().map(TranscriptSegment::end).fold(0.0, f64::max)
}

/// Format seconds as `M:SS`, or `H:MM:SS` past the hour
#[inline]
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
