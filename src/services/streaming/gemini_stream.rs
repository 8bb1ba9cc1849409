//! Gemini streaming handler
//!
//! Processes Server-Sent Events from the `streamGenerateContent` API and turns
//! every vendor chunk into a normalized [`StreamEvent`].

use tracing::debug;

use crate::{
    error::{Result, VidChatError},
    messages::{Source, StreamEvent},
};

use super::{GeminiStreamChunk, SseEvent, SseParser};

/// Handler for Gemini streaming responses
pub struct GeminiStreamHandler {
    /// SSE parser
    parser: SseParser,

    /// Number of vendor chunks translated so far
    chunks_seen: usize,
}

impl GeminiStreamHandler {
    /// Create a new handler
    pub fn new() -> Self {
        Self {
            parser: SseParser::new(),
            chunks_seen: 0,
        }
    }

    /// Process a chunk of streaming bytes
    ///
    /// Returns one event per complete vendor chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the vendor reports an error or sends malformed JSON.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        self.parser
            .parse_chunk(chunk)
            .into_iter()
            .filter_map(|event| self.process_event(&event).transpose())
            .collect()
    }

    /// Flush any event left without a trailing blank line
    ///
    /// # Errors
    ///
    /// Same as [`GeminiStreamHandler::process_chunk`].
    pub fn finish(&mut self) -> Result<Option<StreamEvent>> {
        match self.parser.flush() {
            Some(event) => self.process_event(&event),
            None => Ok(None),
        }
    }

    /// Number of vendor chunks seen
    pub fn chunks_seen(&self) -> usize {
        self.chunks_seen
    }

    fn process_event(&mut self, event: &SseEvent) -> Result<Option<StreamEvent>> {
        if event.is_done_marker() || event.data.trim().is_empty() {
            return Ok(None);
        }

        let chunk: GeminiStreamChunk = serde_json::from_str(&event.data)
            .map_err(|e| VidChatError::MidStream(format!("Failed to parse Gemini chunk: {e}")))?;

        if let Some(error) = chunk.error {
            return Err(VidChatError::MidStream(format!(
                "Gemini stream error: {}",
                error.message
            )));
        }

        self.chunks_seen += 1;
        let event = Self::normalize(&chunk);
        debug!(
            chunk = self.chunks_seen,
            text_len = event.text.len(),
            sources = event.sources.as_ref().map_or(0, Vec::len),
            "Translated Gemini chunk"
        );

        Ok(Some(event))
    }

    /// Map one vendor chunk to a wire event
    pub(crate) fn normalize(chunk: &GeminiStreamChunk) -> StreamEvent {
        let candidate = chunk.candidates.as_ref().and_then(|c| c.first());

        let text = candidate
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default();

        let sources = candidate
            .and_then(|c| c.grounding_metadata.as_ref())
            .and_then(|m| m.grounding_chunks.as_ref())
            .map(|chunks| {
                chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .filter_map(|web| match (&web.title, &web.uri) {
                        (Some(title), Some(uri)) if !title.is_empty() && !uri.is_empty() => {
                            Some(Source {
                                title: title.clone(),
                                uri: uri.clone(),
                            })
                        }
                        _ => None,
                    })
                    .collect::<Vec<_>>()
            });

        StreamEvent { text, sources }
    }
}

impl Default for GeminiStreamHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_text_chunks() {
        let mut handler = GeminiStreamHandler::new();

        let chunk = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hel\"},{\"text\":\"lo\"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\" there\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
        );

        let events = handler.process_chunk(chunk.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::text("Hello"), StreamEvent::text(" there")]
        );
        assert_eq!(handler.chunks_seen(), 2);
    }

    #[test]
    fn test_grounding_sources_are_filtered() {
        let mut handler = GeminiStreamHandler::new();

        let chunk = r#"data: {"candidates":[{"content":{"parts":[{"text":"Paris."}]},"groundingMetadata":{"groundingChunks":[{"web":{"uri":"https://a.example","title":"A"}},{"web":{"uri":"https://b.example"}},{"web":{"uri":"","title":"C"}},{"retrievedContext":{"uri":"gs://x"}}]}}]}

"#;

        let events = handler.process_chunk(chunk.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::text("Paris.").with_sources(vec![Source {
                title: "A".into(),
                uri: "https://a.example".into(),
            }])]
        );
    }

    #[test]
    fn test_empty_chunk_still_emits_event() {
        let mut handler = GeminiStreamHandler::new();
        let events = handler
            .process_chunk(b"data: {\"usageMetadata\":{\"totalTokenCount\":12}}\n\n")
            .unwrap();
        assert_eq!(events, vec![StreamEvent::default()]);
        assert_eq!(events[0].sources, None);
    }

    #[test]
    fn test_chunk_split_across_reads() {
        let mut handler = GeminiStreamHandler::new();
        let bytes = b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"split\"}]}}]}\n\n";

        assert!(handler.process_chunk(&bytes[..20]).unwrap().is_empty());
        let events = handler.process_chunk(&bytes[20..]).unwrap();
        assert_eq!(events, vec![StreamEvent::text("split")]);
    }

    #[test]
    fn test_vendor_error_is_mid_stream_failure() {
        let mut handler = GeminiStreamHandler::new();
        let result = handler
            .process_chunk(b"data: {\"error\":{\"code\":500,\"message\":\"backend exploded\"}}\n\n");
        assert!(matches!(result, Err(VidChatError::MidStream(msg)) if msg.contains("backend exploded")));
    }

    #[test]
    fn test_finish_flushes_trailing_chunk() {
        let mut handler = GeminiStreamHandler::new();
        assert!(handler
            .process_chunk(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"end\"}]}}]}")
            .unwrap()
            .is_empty());
        assert_eq!(handler.finish().unwrap(), Some(StreamEvent::text("end")));
    }
}
