//! Message types for video chat conversations
//!
//! This module defines the transcript entries shown to the user, the request
//! payload sent to the relay, and the stream events flowing back from it.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VidChatError};

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A web citation attached to a model answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

/// Video reference displayed alongside a user message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAttachment {
    pub data_url: String,
    pub name: String,
}

/// A single entry in the visible transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoAttachment>,
}

impl ChatMessage {
    /// Create a new user message
    #[must_use]
    pub fn user(text: impl Into<String>, video: Option<VideoAttachment>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            sources: None,
            video,
        }
    }

    /// Create a finished model message
    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            sources: None,
            video: None,
        }
    }

    /// Create the empty model message that streaming fills in
    #[must_use]
    pub fn placeholder() -> Self {
        Self::model(String::new())
    }

    /// Whether this entry is replayed to the model on the next turn
    ///
    /// Video-only user turns are skipped; model turns are always kept.
    #[must_use]
    pub fn is_replayable(&self) -> bool {
        self.role == Role::Model || !self.text.trim().is_empty()
    }
}

/// One wire-level update: a text delta plus optional citations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
}

impl StreamEvent {
    /// Create a text-only event
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: None,
        }
    }

    /// Attach citations to the event
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = Some(sources);
        self
    }
}

/// Base64 media embedded directly in a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Part of a turn: either text or inline media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub const fn is_inline_data(&self) -> bool {
        matches!(self, Self::InlineData { .. })
    }
}

/// One turn of the conversation as sent to the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

/// Request body accepted by the stream relay endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub contents: Vec<Content>,
    pub system_instruction: String,
}

impl ChatRequest {
    /// Count inline media parts across all turns
    #[must_use]
    pub fn inline_media_count(&self) -> usize {
        self.contents
            .iter()
            .flat_map(|content| &content.parts)
            .filter(|part| part.is_inline_data())
            .count()
    }

    /// Check the structural rules of a request
    ///
    /// # Errors
    ///
    /// Returns a validation error if the request has no turns, or carries inline
    /// media anywhere other than a single part of the final user turn.
    pub fn validate(&self) -> Result<()> {
        let Some(last) = self.contents.last() else {
            return Err(VidChatError::Validation(
                "contents must contain at least one turn".to_string(),
            ));
        };

        let media = self.inline_media_count();
        if media > 1 {
            return Err(VidChatError::Validation(
                "at most one inline media part is allowed per request".to_string(),
            ));
        }

        if media == 1 && (last.role != Role::User || !last.parts.iter().any(Part::is_inline_data))
        {
            return Err(VidChatError::Validation(
                "inline media may only be attached to the latest user turn".to_string(),
            ));
        }

        Ok(())
    }
}

/// Response body of the media fetch relay endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    pub base64_data: String,
    pub mime_type: String,
}

/// A video waiting to be sent with the next prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedVideo {
    pub name: String,
    pub mime_type: String,
    pub base64_data: String,
}

impl StagedVideo {
    const FALLBACK_NAME: &'static str = "video.mp4";

    /// Stage a video downloaded through the media relay
    #[must_use]
    pub fn from_payload(url: &str, payload: MediaPayload) -> Self {
        let name = url
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or(Self::FALLBACK_NAME)
            .to_string();

        Self {
            name,
            mime_type: payload.mime_type,
            base64_data: payload.base64_data,
        }
    }

    /// Stage a local video file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a video.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        if mime.type_() != mime_guess::mime::VIDEO {
            return Err(VidChatError::Validation(format!(
                "{} is not a video file ({mime})",
                path.display()
            )));
        }

        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map_or_else(|| Self::FALLBACK_NAME.to_string(), |n| n.to_string_lossy().into_owned());

        Ok(Self {
            name,
            mime_type: mime.essence_str().to_string(),
            base64_data: STANDARD.encode(bytes),
        })
    }

    /// `data:` URL used to display the video in the transcript
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data)
    }

    /// Attachment reference for the user message
    #[must_use]
    pub fn attachment(&self) -> VideoAttachment {
        VideoAttachment {
            data_url: self.data_url(),
            name: self.name.clone(),
        }
    }

    /// Inline part for the outgoing request
    #[must_use]
    pub fn inline_part(&self) -> Part {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: self.mime_type.clone(),
                data: self.base64_data.clone(),
            },
        }
    }
}
