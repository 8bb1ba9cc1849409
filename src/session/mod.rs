//! Chat session controller
//!
//! Owns the visible transcript and the pending input (draft text plus at most
//! one staged video), and drives one exchange at a time:
//!
//! ```text
//! Idle -> Sending -> Streaming -> Settled
//!            \           \
//!             +-----------+----> RolledBack
//! ```
//!
//! The user message and an empty model placeholder are appended optimistically
//! when an exchange starts. If anything fails before the stream ends, both are
//! removed again, so a visible model message is always either complete or
//! absent.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    client::ChatTransport,
    error::{Result, VidChatError},
    messages::{ChatMessage, ChatRequest, Content, Part, Role, StagedVideo, StreamEvent},
    protocol::FrameDecoder,
};

/// Where the session is in its current (or last) exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangePhase {
    /// Nothing has happened yet
    #[default]
    Idle,
    /// A remote video is being loaded through the relay
    FetchingMedia,
    /// Request sent, waiting for the first frame
    Sending,
    /// Frames are being merged into the placeholder
    Streaming,
    /// Last exchange completed
    Settled,
    /// Last exchange failed and was removed from the transcript
    RolledBack,
}

impl ExchangePhase {
    /// Whether a request is outstanding
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::FetchingMedia | Self::Sending | Self::Streaming)
    }

    const fn is_exchanging(self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }
}

/// Client-side conversation state
#[derive(Debug, Default)]
pub struct ChatSession {
    transcript: Vec<ChatMessage>,
    draft: String,
    staged_video: Option<StagedVideo>,
    system_instruction: String,
    phase: ExchangePhase,

    /// Text received so far for the current placeholder
    accumulated: String,

    last_error: Option<String>,
}

impl ChatSession {
    /// Create an empty session
    #[must_use]
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    #[must_use]
    pub fn staged_video(&self) -> Option<&StagedVideo> {
        self.staged_video.as_ref()
    }

    #[must_use]
    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    /// Message from the most recent failure, cleared by the next exchange
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether an exchange or video load is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.phase.is_in_flight()
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Stage a video for the next submission, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns `Busy` while a request is in flight
    pub fn stage_video(&mut self, video: StagedVideo) -> Result<()> {
        if self.is_busy() {
            return Err(VidChatError::Busy);
        }
        debug!(name = %video.name, mime = %video.mime_type, "Staged video");
        self.staged_video = Some(video);
        Ok(())
    }

    /// Remove the staged video, returning it
    pub fn clear_staged_video(&mut self) -> Option<StagedVideo> {
        self.staged_video.take()
    }

    /// Start an exchange from the current draft and staged video
    ///
    /// Appends the user message and an empty model placeholder, clears the
    /// pending input and returns the request to send.
    ///
    /// # Errors
    ///
    /// - `Busy` if another request is in flight
    /// - `EmptySubmission` if the draft is blank and no video is staged
    pub fn begin_exchange(&mut self) -> Result<ChatRequest> {
        if self.is_busy() {
            return Err(VidChatError::Busy);
        }

        let blank = self.draft.trim().is_empty();
        if blank && self.staged_video.is_none() {
            return Err(VidChatError::EmptySubmission);
        }

        // Attachments are never replayed; video-only user turns drop out entirely
        let mut contents: Vec<Content> = self
            .transcript
            .iter()
            .filter(|message| message.is_replayable())
            .map(|message| Content {
                role: message.role,
                parts: vec![Part::text(message.text.clone())],
            })
            .collect();

        let text = std::mem::take(&mut self.draft);
        let staged = self.staged_video.take();

        let mut parts = Vec::with_capacity(2);
        if !blank {
            parts.push(Part::text(text.clone()));
        }
        if let Some(video) = &staged {
            parts.push(video.inline_part());
        }
        contents.push(Content {
            role: Role::User,
            parts,
        });

        self.transcript
            .push(ChatMessage::user(text, staged.as_ref().map(StagedVideo::attachment)));
        self.transcript.push(ChatMessage::placeholder());

        self.accumulated.clear();
        self.last_error = None;
        self.phase = ExchangePhase::Sending;

        debug!(
            turns = contents.len(),
            video = staged.is_some(),
            "Exchange started"
        );

        Ok(ChatRequest {
            contents,
            system_instruction: self.system_instruction.clone(),
        })
    }

    /// Merge one decoded event into the placeholder
    ///
    /// Returns the updated placeholder, or `None` if no exchange is active.
    pub fn apply_event(&mut self, event: StreamEvent) -> Option<&ChatMessage> {
        if !self.phase.is_exchanging() {
            warn!(phase = ?self.phase, "Ignoring stream event outside an exchange");
            return None;
        }
        self.phase = ExchangePhase::Streaming;
        self.accumulated.push_str(&event.text);

        let placeholder = self.transcript.last_mut()?;
        placeholder.text.clone_from(&self.accumulated);
        if let Some(sources) = event.sources.filter(|sources| !sources.is_empty()) {
            placeholder.sources = Some(sources);
        }

        Some(placeholder)
    }

    /// Freeze the placeholder as the final answer
    pub fn settle(&mut self) {
        if self.phase.is_exchanging() {
            debug!(chars = self.accumulated.len(), "Exchange settled");
            self.phase = ExchangePhase::Settled;
        }
    }

    /// Undo the current exchange and record the failure
    ///
    /// The user message and placeholder appended by [`Self::begin_exchange`]
    /// are removed however much text had already streamed in.
    pub fn roll_back(&mut self, error: &VidChatError) {
        if self.phase.is_exchanging() {
            let keep = self.transcript.len().saturating_sub(2);
            self.transcript.truncate(keep);
            self.phase = ExchangePhase::RolledBack;
        }
        warn!(error = %error, "Exchange rolled back");
        self.accumulated.clear();
        self.last_error = Some(error.to_string());
    }

    /// Run a full exchange against the relay
    ///
    /// `on_update` is called with the placeholder after every merged event.
    /// Cancelling `cancel` drops the response body and rolls the exchange
    /// back with [`VidChatError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns the admission error (`Busy`, `EmptySubmission`) without
    /// touching the transcript, or the failure that caused a rollback.
    pub async fn run_exchange<F>(
        &mut self,
        transport: &dyn ChatTransport,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> Result<()>
    where
        F: FnMut(&ChatMessage) + Send,
    {
        let request = self.begin_exchange()?;

        match self.stream_into_placeholder(transport, &request, cancel, &mut on_update).await {
            Ok(()) => {
                self.settle();
                Ok(())
            }
            Err(e) => {
                self.roll_back(&e);
                Err(e)
            }
        }
    }

    async fn stream_into_placeholder<F>(
        &mut self,
        transport: &dyn ChatTransport,
        request: &ChatRequest,
        cancel: &CancellationToken,
        on_update: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&ChatMessage) + Send,
    {
        let mut body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(VidChatError::Cancelled),
            opened = transport.open_stream(request) => opened?,
        };

        let mut decoder = FrameDecoder::new();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(VidChatError::Cancelled),
                next = body.next() => next,
            };
            let Some(chunk) = next else { break };

            for event in decoder.push(&chunk?) {
                if let Some(message) = self.apply_event(event) {
                    on_update(message);
                }
            }
        }

        if let Some(event) = decoder.finish() {
            if let Some(message) = self.apply_event(event) {
                on_update(message);
            }
        }

        Ok(())
    }

    /// Load a remote video through the relay and stage it
    ///
    /// Shares the single-flight guard with exchanges, so a video cannot be
    /// loaded while an answer is streaming and vice versa. On failure or
    /// cancellation the staged video is left as it was.
    ///
    /// # Errors
    ///
    /// Returns `Busy`, a validation error for a blank URL, `Cancelled`, or the
    /// relay error
    pub async fn load_video_url(
        &mut self,
        transport: &dyn ChatTransport,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.is_busy() {
            return Err(VidChatError::Busy);
        }
        let url = url.trim();
        if url.is_empty() {
            return Err(VidChatError::Validation("URL is required".to_string()));
        }

        let prior = self.phase;
        self.phase = ExchangePhase::FetchingMedia;
        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(VidChatError::Cancelled),
            fetched = transport.fetch_video(url) => fetched,
        };
        self.phase = prior;

        match fetched {
            Ok(payload) => {
                let video = StagedVideo::from_payload(url, payload);
                debug!(name = %video.name, "Loaded remote video");
                self.staged_video = Some(video);
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, %url, "Failed to load remote video");
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}
