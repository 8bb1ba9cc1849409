//! Media fetch relay endpoint (`POST /api/proxy-video`)
//!
//! Downloads a remote video on the client's behalf and returns it base64
//! encoded, so browsers never hit cross-origin restrictions.

use std::time::Duration;

use axum::{body::Bytes, extract::State, Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT},
    Client, Url,
};
use tracing::{debug, error, warn};

use super::AppState;
use crate::{
    config::ServerConfig,
    error::{Result, VidChatError},
    messages::MediaPayload,
};

/// Fetches remote videos with a size ceiling
pub struct MediaFetcher {
    client: Client,
    max_bytes: u64,
}

impl MediaFetcher {
    /// Create a fetcher with an explicit size limit and timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(max_bytes: u64, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0 (compatible; vidchat/0.1)"));
        headers.insert(ACCEPT, HeaderValue::from_static("video/*,*/*;q=0.5"));

        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .default_headers(headers)
            .build()?;

        Ok(Self { client, max_bytes })
    }

    /// Create a fetcher from server settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new(
            config.max_media_bytes,
            Duration::from_secs(config.media_timeout_secs),
        )
    }

    /// Download a video and encode it for inline embedding
    ///
    /// # Errors
    ///
    /// - `Validation` if the URL is not an http(s) URL
    /// - `UpstreamFetch` with the remote status if the fetch fails, or 400 if
    ///   the resource is not a video
    /// - `PayloadTooLarge` if the body exceeds the configured limit
    pub async fn fetch(&self, url: &str) -> Result<MediaPayload> {
        let url = Url::parse(url.trim())
            .map_err(|e| VidChatError::Validation(format!("Invalid URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VidChatError::Validation(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        let mut response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VidChatError::UpstreamFetch {
                status: status.as_u16(),
                message: "Failed to fetch the video from the URL".to_string(),
            });
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if !mime_type.starts_with("video/") {
            return Err(VidChatError::UpstreamFetch {
                status: 400,
                message: "The URL does not point to a valid video type".to_string(),
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > self.max_bytes) {
            return Err(VidChatError::PayloadTooLarge {
                limit: self.max_bytes,
            });
        }

        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (data.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(VidChatError::PayloadTooLarge {
                    limit: self.max_bytes,
                });
            }
            data.extend_from_slice(&chunk);
        }

        debug!(%url, bytes = data.len(), %mime_type, "Fetched remote video");

        Ok(MediaPayload {
            base64_data: STANDARD.encode(&data),
            mime_type,
        })
    }
}

/// Proxy a remote video back to the client as base64
pub async fn proxy_video(
    State(state): State<AppState>,
    body: Bytes,
) -> std::result::Result<Json<MediaPayload>, VidChatError> {
    let url = parse_url(&body).inspect_err(|e| warn!(error = %e, "Rejected video proxy request"))?;

    state.media().fetch(&url).await.map(Json).map_err(|e| {
        error!(error = %e, %url, "Video proxy failed");
        e
    })
}

/// Extract a non-blank `url` string from the request body
fn parse_url(body: &[u8]) -> Result<String> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|_| VidChatError::Validation("Request body must be a JSON object".to_string()))?;

    value
        .get("url")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or_else(|| VidChatError::Validation("URL is required".to_string()))
}
