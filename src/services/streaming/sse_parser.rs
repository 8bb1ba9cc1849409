//! Server-Sent Events (SSE) parser for the upstream provider
//!
//! Works on raw bytes: a network read may end anywhere, including inside a
//! multi-byte character or between the `\r` and `\n` of a line ending.
//! See <https://html.spec.whatwg.org/multipage/server-sent-events.html>.

/// One dispatched SSE event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, if any
    pub event: Option<String>,

    /// `data:` lines joined with `\n`
    pub data: String,

    /// `id:` field, if any
    pub id: Option<String>,
}

impl SseEvent {
    /// `[DONE]` terminator sent by some gateways
    pub fn is_done_marker(&self) -> bool {
        self.data == "[DONE]"
    }
}

/// Incremental SSE parser
///
/// Carriage returns are dropped on input, so `\r\n\r\n` and `\n\n` both end
/// an event.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: Vec<u8>,

    /// Prefix of `pending` already searched for a blank line
    scanned: usize,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and collect every event they complete
    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut events = Vec::new();
        loop {
            let start = self.scanned.saturating_sub(1);
            let Some(offset) = self.pending[start..].windows(2).position(|w| w == b"\n\n") else {
                self.scanned = self.pending.len();
                break;
            };

            let end = start + offset;
            let block: Vec<u8> = self.pending.drain(..end + 2).collect();
            self.scanned = 0;
            events.extend(Self::parse_block(&block[..end]));
        }
        events
    }

    /// Dispatch whatever is left once the stream has ended
    pub fn flush(&mut self) -> Option<SseEvent> {
        let block = std::mem::take(&mut self.pending);
        self.scanned = 0;
        Self::parse_block(&block)
    }

    /// Parse the field lines of one event; events without data are dropped
    fn parse_block(block: &[u8]) -> Option<SseEvent> {
        let text = String::from_utf8_lossy(block);
        let mut event = SseEvent::default();
        let mut data_lines: Vec<&str> = Vec::new();

        for line in text.split('\n').filter(|line| !line.starts_with(':')) {
            let (field, value) = line
                .split_once(':')
                .map_or((line, ""), |(f, v)| (f, v.strip_prefix(' ').unwrap_or(v)));

            match field {
                "data" => data_lines.push(value),
                "event" => event.event = Some(value.to_string()),
                "id" => event.id = Some(value.to_string()),
                // retry and unknown fields
                _ => {}
            }
        }

        if data_lines.is_empty() {
            return None;
        }
        event.data = data_lines.join("\n");
        Some(event)
    }
}
