// Seams to the systems around the router: transcript extraction and the hosted model

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::router::PromptContext;
use crate::transcript::TranscriptSegment;

/// A video's transcript and its length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTranscript {
    pub video_id: String,
    pub duration_seconds: f64,
    pub segments: Vec<TranscriptSegment>,
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// `Ok(None)` when the video has no transcript
    async fn fetch_transcript(&self, video_id: &str) -> Result<Option<VideoTranscript>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    pub temperature: f32,
    pub max_output_tokens: usize,
}

impl Default for ModelOptions {
    #[inline]
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 2048,
        }
    }
}

/// A model response with the usage the provider reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub output_tokens: usize,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, context: &PromptContext, options: &ModelOptions) -> Result<Generation>;
}
