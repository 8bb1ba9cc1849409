//! Service layer for the upstream generation provider
//!
//! The relay only ever talks to backends through [`GenerationBackend`], so the
//! HTTP handlers stay independent of any particular vendor.

pub mod gemini;
pub mod streaming;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{
    error::Result,
    messages::{ChatRequest, StreamEvent},
};

pub use gemini::GeminiAdapter;

/// Stream of normalized events produced by a backend session
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Core trait for generation backends
///
/// Opening a session either fails synchronously or yields a stream; no
/// partial stream is produced when setup fails.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Get the provider name (e.g., "gemini")
    fn provider(&self) -> &str;

    /// Get the model name
    fn model(&self) -> &str;

    /// Open a streaming generation session for the request
    async fn stream_generate(&self, request: ChatRequest) -> Result<EventStream>;
}
