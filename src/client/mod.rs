//! HTTP client for the relay server
//!
//! [`ChatTransport`] is the seam between the session controller and the
//! network; [`RelayClient`] implements it over reqwest.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::{Client, Response};
use serde_json::json;
use tracing::{debug, warn};

use crate::{
    error::{Result, VidChatError},
    messages::{ChatRequest, MediaPayload},
};

/// Relay path that streams model output
pub const GENERATE_PATH: &str = "/api/generate";

/// Relay path that proxies remote videos
pub const PROXY_VIDEO_PATH: &str = "/api/proxy-video";

const GENERATE_FAILED: &str = "Failed to get response from server.";
const VIDEO_FAILED: &str = "Failed to load video from URL. Please check the link and try again.";

/// Raw response body chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Transport used by the chat session to reach the relay
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open a generation stream and return its undecoded body
    ///
    /// Resolves once response headers arrive. A non-success status is an
    /// error; no body is returned in that case.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream>;

    /// Download a remote video through the relay
    async fn fetch_video(&self, url: &str) -> Result<MediaPayload>;
}

/// reqwest-backed relay client
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    /// Create a client for the relay at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL of the relay
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl ChatTransport for RelayClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        debug!(turns = request.contents.len(), "Posting chat request to relay");

        let response = self
            .client
            .post(self.url(GENERATE_PATH))
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response, GENERATE_FAILED).await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| VidChatError::MidStream(e.to_string())));
        Ok(Box::pin(body))
    }

    async fn fetch_video(&self, url: &str) -> Result<MediaPayload> {
        debug!(%url, "Requesting video through relay");

        let response = self
            .client
            .post(self.url(PROXY_VIDEO_PATH))
            .json(&json!({ "url": url }))
            .send()
            .await?;
        let response = ensure_success(response, VIDEO_FAILED).await?;

        Ok(response.json().await?)
    }
}

/// Turn a non-success response into a [`VidChatError::Relay`]
///
/// The server's `{"error": ...}` message is used when present.
async fn ensure_success(response: Response, fallback: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body["error"].as_str().map(str::to_string))
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| fallback.to_string());

    warn!(status = status.as_u16(), %message, "Relay request failed");
    Err(VidChatError::Relay {
        status: status.as_u16(),
        message,
    })
}
