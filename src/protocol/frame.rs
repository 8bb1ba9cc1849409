//! Frame codec for the relay event stream
//!
//! Frames follow the server-sent events convention with a single `data:` field
//! and a blank-line terminator. The decoder tolerates arbitrary read boundaries,
//! including splits inside the delimiter or inside a multi-byte character.

use bytes::Bytes;
use tracing::warn;

use crate::{error::Result, messages::StreamEvent};

/// Marker that starts every frame
pub const DATA_PREFIX: &str = "data: ";

/// Blank line that terminates every frame
pub const FRAME_DELIMITER: &str = "\n\n";

/// Encode an event as a self-terminated text frame
///
/// # Errors
///
/// Returns an error if the event cannot be serialized
pub fn encode(event: &StreamEvent) -> Result<String> {
    let payload = serde_json::to_string(event)?;
    Ok(format!("{DATA_PREFIX}{payload}{FRAME_DELIMITER}"))
}

/// Encode an event directly into an HTTP body chunk
///
/// # Errors
///
/// Returns an error if the event cannot be serialized
pub fn encode_bytes(event: &StreamEvent) -> Result<Bytes> {
    encode(event).map(Bytes::from)
}

/// Incremental frame decoder
///
/// Bytes that do not yet form a complete frame are carried over to the next
/// call to [`FrameDecoder::push`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,

    /// Prefix of `buffer` already searched without finding a delimiter
    scanned: usize,
}

impl FrameDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let delimiter = FRAME_DELIMITER.as_bytes();
        let mut events = Vec::new();
        loop {
            // A delimiter may straddle the old and new bytes
            let start = self.scanned.saturating_sub(delimiter.len() - 1);
            let Some(offset) = find_delimiter(&self.buffer[start..]) else {
                self.scanned = self.buffer.len();
                break;
            };

            let end = start + offset;
            let fragment: Vec<u8> = self.buffer.drain(..end + delimiter.len()).collect();
            self.scanned = 0;
            if let Some(event) = Self::decode_fragment(&fragment[..end]) {
                events.push(event);
            }
        }

        events
    }

    /// Flush a trailing frame that was never terminated
    ///
    /// Call once the underlying stream has ended.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let fragment = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        Self::decode_fragment(&fragment)
    }

    /// Number of buffered bytes waiting for a delimiter
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Decode one delimiter-free fragment, skipping noise and bad payloads
    fn decode_fragment(fragment: &[u8]) -> Option<StreamEvent> {
        let text = match std::str::from_utf8(fragment) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Skipping frame with invalid UTF-8");
                return None;
            }
        };

        // Keep-alive comments and anything else without the marker
        let payload = text.strip_prefix(DATA_PREFIX)?;
        if payload.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<StreamEvent>(payload) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, payload = %payload, "Failed to parse stream frame");
                None
            }
        }
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    let delimiter = FRAME_DELIMITER.as_bytes();
    buffer
        .windows(delimiter.len())
        .position(|window| window == delimiter)
}
