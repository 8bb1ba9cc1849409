//! Server and client settings

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VidChatError};

/// Model used for every generation session
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Base URL for the Generative Language API
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default ceiling for videos fetched through the media relay (100 MiB)
pub const DEFAULT_MAX_MEDIA_BYTES: u64 = 100 * 1024 * 1024;

/// Instruction sent with every chat request unless overridden
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "**CRITICAL INSTRUCTIONS - FOLLOW THESE RULES:**

1.  **Check for a video FIRST.**

2.  **IF A VIDEO IS PROVIDED:**
    a.  **Analyze the User's Prompt:**
        i.  **Is the prompt CLEARLY asking about the video?** (e.g., \"summarize this,\" \"what is happening here?,\" \"describe the video\"). If YES, then analyze the video and provide a detailed answer.
        ii. **Is the prompt CLEARLY a general question, unrelated to the video?** (e.g., \"what is the capital of France?,\" \"tell me a joke\"). If YES, you MUST IGNORE the video completely. Just answer the question as a general AI assistant.
        iii. **Is the prompt ambiguous, generic, or potentially unrelated?** (e.g., \"hi,\" \"undefined,\" a single word). If YES, DO NOT analyze the video. Instead, you MUST ask for clarification by responding ONLY with: \"I see you've uploaded a video. Did you want to ask something about it?\"

3.  **IF NO VIDEO IS PROVIDED:**
    a.  Treat the conversation as a general chat.
    b.  Respond helpfully and conversationally to any prompt. For a simple greeting like \"hi\", respond with a friendly greeting in return.

4.  **General Rule:** If you use web search for any answer, you MUST cite your sources. Be helpful and friendly.";

/// Relay server settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the relay listens on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Credential for the generation API
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Generation API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Largest video the media relay will buffer
    #[serde(default = "default_max_media_bytes")]
    pub max_media_bytes: u64,

    /// Timeout for fetching remote videos
    #[serde(default = "default_media_timeout_secs")]
    pub media_timeout_secs: u64,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_max_media_bytes() -> u64 {
    DEFAULT_MAX_MEDIA_BYTES
}

fn default_media_timeout_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            max_media_bytes: default_max_media_bytes(),
            media_timeout_secs: default_media_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_media_bytes", &self.max_media_bytes)
            .field("media_timeout_secs", &self.media_timeout_secs)
            .finish()
    }
}

impl ServerConfig {
    /// Check the settings before accepting traffic
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is missing or blank
    pub fn validate(&self) -> Result<()> {
        if self.api_key.as_deref().map_or(true, |key| key.trim().is_empty()) {
            return Err(VidChatError::Configuration(
                "API key is not configured on the server (set API_KEY)".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(VidChatError::Configuration("model must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Chat client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the relay server
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Instruction sent with every chat request
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
}

fn default_relay_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_system_instruction() -> String {
    DEFAULT_SYSTEM_INSTRUCTION.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            system_instruction: default_system_instruction(),
        }
    }
}
