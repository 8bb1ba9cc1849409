//! Configuration management for vidchat-rs
//!
//! Implements a layered configuration system:
//! 1. Built-in defaults
//! 2. Config file (`~/.config/vidchat/config.json` or an explicit path)
//! 3. Environment variables (a `.env` file is honoured)
//! 4. CLI parameters (highest priority, applied by the caller)
//!
//! Everything is read once at startup; the server never consults the
//! environment while handling requests.

pub mod settings;

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use self::settings::{
    ClientConfig, ServerConfig, DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION,
};
use crate::error::{Result, VidChatError};

/// Environment variable holding the generation API key
pub const API_KEY_ENV: &str = "API_KEY";

/// Alternate environment variable for the API key
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Main configuration structure combining server and client settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Relay server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Chat client settings
    #[serde(default)]
    pub client: ClientConfig,
}

impl Config {
    /// Load configuration from the default file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be parsed
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Load configuration from an optional explicit file and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be parsed
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenv::dotenv();

        let path = path.map_or_else(Self::global_config_path, Path::to_path_buf);
        let mut config = Self::load_from_path(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| VidChatError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        serde_json::from_str(&contents).map_err(|e| VidChatError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Overlay environment variables onto the loaded settings
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var(API_KEY_ENV).or_else(|| var(GEMINI_API_KEY_ENV)) {
            self.server.api_key = Some(key);
        }
        if let Some(bind) = var("VIDCHAT_BIND").and_then(|v| v.parse().ok()) {
            self.server.bind_addr = bind;
        }
        if let Some(model) = var("VIDCHAT_MODEL") {
            self.server.model = model;
        }
        if let Some(url) = var("VIDCHAT_RELAY_URL") {
            self.client.relay_url = url;
        }
    }

    /// Get the configuration directory path
    #[must_use]
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vidchat")
    }

    /// Get the global config file path
    #[must_use]
    pub fn global_config_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_config_paths() {
        let global_path = Config::global_config_path();
        assert!(global_path.ends_with("vidchat/config.json"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from_path(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(config.server.model, DEFAULT_MODEL);
        assert_eq!(config.client.relay_url, "http://127.0.0.1:8787");
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"server":{"bind_addr":"0.0.0.0:9000","max_media_bytes":1024},"client":{"relay_url":"http://relay"}}"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.server.bind_addr.port(), 9000);
        assert_eq!(config.server.max_media_bytes, 1024);
        assert_eq!(config.server.model, DEFAULT_MODEL);
        assert_eq!(config.client.relay_url, "http://relay");
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Config::load_from_path(&path),
            Err(VidChatError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GEMINI_API_KEY", "from-gemini-var"),
            ("VIDCHAT_BIND", "127.0.0.1:4000"),
            ("VIDCHAT_RELAY_URL", "http://elsewhere"),
        ]);

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.server.api_key.as_deref(), Some("from-gemini-var"));
        assert_eq!(config.server.bind_addr.port(), 4000);
        assert_eq!(config.client.relay_url, "http://elsewhere");
    }

    #[test]
    fn test_api_key_var_takes_precedence() {
        let env: HashMap<&str, &str> =
            HashMap::from([("API_KEY", "primary"), ("GEMINI_API_KEY", "secondary")]);

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| (*v).to_string()));
        assert_eq!(config.server.api_key.as_deref(), Some("primary"));
    }
}
