//! Google Gemini streaming adapter
//!
//! Opens a `streamGenerateContent` session with web search grounding enabled
//! and translates the vendor stream into [`StreamEvent`]s.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::{header, Client};
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::{
    config::ServerConfig,
    error::{Result, VidChatError},
    messages::{ChatRequest, Content, Part, StreamEvent},
};

use super::{streaming::GeminiStreamHandler, EventStream, GenerationBackend};

/// Sampling temperature applied to every session
pub const TEMPERATURE: f64 = 0.7;

/// Gemini API adapter
pub struct GeminiAdapter {
    client: Client,
    model: String,
    base_url: String,
}

impl GeminiAdapter {
    /// Create a new adapter with an explicit credential
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid header value or the HTTP
    /// client cannot be built
    pub fn new(api_key: &str, model: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .default_headers({
                let mut headers = header::HeaderMap::new();
                let mut key = header::HeaderValue::from_str(api_key).map_err(|_| {
                    VidChatError::Configuration("Invalid API key format".to_string())
                })?;
                key.set_sensitive(true);
                headers.insert("x-goog-api-key", key);
                headers
            })
            .build()?;

        Ok(Self {
            client,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create an adapter from validated server settings
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no API key is set
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let api_key = config.api_key.as_deref().unwrap_or_default();
        Self::new(api_key, config.model.clone(), config.base_url.clone())
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent",
            self.base_url, self.model
        )
    }

    /// Build the vendor request with the fixed generation policy
    fn build_request(request: ChatRequest) -> GeminiRequest {
        GeminiRequest {
            contents: request.contents,
            system_instruction: (!request.system_instruction.is_empty()).then(|| {
                SystemInstruction {
                    parts: vec![Part::text(request.system_instruction)],
                }
            }),
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
            tools: vec![GeminiTool {
                google_search: GoogleSearch {},
            }],
        }
    }

    /// Process SSE byte stream into StreamEvents
    fn process_stream(
        byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    ) -> impl Stream<Item = Result<StreamEvent>> + Send + 'static {
        async_stream::stream! {
            let mut handler = GeminiStreamHandler::new();
            let mut byte_stream = Box::pin(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(bytes) => match handler.process_chunk(&bytes) {
                        Ok(events) => {
                            for event in events {
                                yield Ok(event);
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                    Err(e) => {
                        yield Err(VidChatError::MidStream(e.to_string()));
                        return;
                    }
                }
            }

            match handler.finish() {
                Ok(Some(event)) => yield Ok(event),
                Ok(None) => {}
                Err(e) => yield Err(e),
            }

            debug!(chunks = handler.chunks_seen(), "Gemini stream finished");
        }
    }
}

#[async_trait]
impl GenerationBackend for GeminiAdapter {
    fn provider(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(model = %self.model, turns = request.contents.len()))]
    async fn stream_generate(&self, request: ChatRequest) -> Result<EventStream> {
        let body = Self::build_request(request);

        debug!("Starting streaming request to Gemini API");

        let response = self
            .client
            .post(self.stream_url())
            .query(&[("alt", "sse")])
            .json(&body)
            .send()
            .await
            .map_err(|e| VidChatError::StreamSetup(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, "Gemini API error");
            return Err(VidChatError::StreamSetup(format!(
                "Gemini API error ({status}): {}",
                extract_error_message(&error_text)
            )));
        }

        let stream = Self::process_stream(response.bytes_stream());
        Ok(Box::pin(stream))
    }
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Pull `error.message` out of a Google API error body, if present
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

// Gemini API types

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
    tools: Vec<GeminiTool>,
}

#[derive(Debug, Clone, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    google_search: GoogleSearch,
}

#[derive(Debug, Clone, Serialize)]
struct GoogleSearch {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Role, Source};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn hi_request() -> ChatRequest {
        ChatRequest {
            contents: vec![Content {
                role: Role::User,
                parts: vec![Part::text("hi")],
            }],
            system_instruction: "be brief".to_string(),
        }
    }

    #[test]
    fn test_request_carries_fixed_policy() {
        let body = serde_json::to_value(GeminiAdapter::build_request(hi_request())).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
                "systemInstruction": {"parts": [{"text": "be brief"}]},
                "generationConfig": {"temperature": 0.7},
                "tools": [{"googleSearch": {}}]
            })
        );
    }

    #[test]
    fn test_extract_error_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(extract_error_message(body), "API key not valid");
        assert_eq!(extract_error_message("plain failure"), "plain failure");
    }

    #[tokio::test]
    async fn test_stream_generate_translates_chunks() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hello\"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\" there\"}]},",
            "\"groundingMetadata\":{\"groundingChunks\":[{\"web\":{\"uri\":\"https://x.example\",\"title\":\"X\"}}]}}]}\r\n\r\n",
        );

        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({"tools": [{"googleSearch": {}}]})))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let adapter = GeminiAdapter::new("test-key", "gemini-2.5-flash", server.uri()).unwrap();
        let stream = adapter.stream_generate(hi_request()).await.unwrap();
        let events: Vec<StreamEvent> = stream.map(|e| e.unwrap()).collect().await;

        assert_eq!(
            events,
            vec![
                StreamEvent::text("Hello"),
                StreamEvent::text(" there").with_sources(vec![Source {
                    title: "X".into(),
                    uri: "https://x.example".into(),
                }]),
            ]
        );
    }

    #[tokio::test]
    async fn test_setup_failure_is_reported_before_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "Permission denied"}
            })))
            .mount(&server)
            .await;

        let adapter = GeminiAdapter::new("bad-key", "gemini-2.5-flash", server.uri()).unwrap();
        let result = adapter.stream_generate(hi_request()).await;

        match result {
            Err(VidChatError::StreamSetup(message)) => {
                assert!(message.contains("Permission denied"), "{message}");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected setup failure"),
        }
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = ServerConfig::default();
        assert!(matches!(
            GeminiAdapter::from_config(&config),
            Err(VidChatError::Configuration(_))
        ));
    }
}
