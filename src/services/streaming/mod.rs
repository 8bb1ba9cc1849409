//! Streaming support for upstream model responses
//!
//! Provides infrastructure for handling Server-Sent Events (SSE) streams
//! from the generation provider.

pub mod gemini_stream;
pub mod sse_parser;

pub use gemini_stream::GeminiStreamHandler;
pub use sse_parser::{SseEvent, SseParser};

use serde::Deserialize;

/// One `streamGenerateContent` chunk
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiStreamChunk {
    pub candidates: Option<Vec<GeminiCandidate>>,
    pub error: Option<GeminiErrorData>,
}

/// Response candidate
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    pub content: Option<GeminiCandidateContent>,
    pub finish_reason: Option<String>,
    pub grounding_metadata: Option<GroundingMetadata>,
}

/// Content of a candidate
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiCandidateContent {
    #[serde(default)]
    pub parts: Vec<GeminiCandidatePart>,
}

/// Part of candidate content; only text is relayed
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiCandidatePart {
    pub text: Option<String>,
}

/// Search grounding attached to a candidate
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    pub grounding_chunks: Option<Vec<GroundingChunk>>,
}

/// One grounding reference
#[derive(Debug, Clone, Deserialize)]
pub struct GroundingChunk {
    pub web: Option<WebGroundingChunk>,
}

/// Web page used for grounding
#[derive(Debug, Clone, Deserialize)]
pub struct WebGroundingChunk {
    pub uri: Option<String>,
    pub title: Option<String>,
}

/// Error object embedded in a stream chunk
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiErrorData {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}
