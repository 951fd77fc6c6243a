//! Client configuration.

use crate::history::DEFAULT_HISTORY_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default delay between the last change and the save.
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 2000;
/// Default time the "saved" status stays visible.
pub const DEFAULT_SAVED_DISPLAY_MS: u64 = 2000;
const DEFAULT_API_URL: &str = "http://localhost:3000/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Settings for the whiteboard client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL of the board server.
    pub api_base_url: Url,
    /// Bearer token of the signed-in session.
    pub session_token: Option<String>,
    pub save_debounce_ms: u64,
    pub saved_display_ms: u64,
    pub history_limit: usize,
    /// Where local drafts are kept. `None` uses the platform data directory.
    pub draft_dir: Option<PathBuf>,
    /// Keep local drafts at all.
    pub drafts_enabled: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_url(),
            session_token: None,
            save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            saved_display_ms: DEFAULT_SAVED_DISPLAY_MS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            draft_dir: None,
            drafts_enabled: true,
        }
    }
}

fn default_api_url() -> Url {
    match Url::parse(DEFAULT_API_URL) {
        Ok(url) => url,
        Err(_) => unreachable!("default API URL is valid"),
    }
}

impl ClientConfig {
    /// Read configuration from `INKBOARD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from a key lookup, starting from defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup("INKBOARD_API_URL") {
            config.api_base_url = Url::parse(&value).map_err(|_| ConfigError::InvalidValue {
                key: "INKBOARD_API_URL",
                value,
            })?;
        }
        if let Some(token) = lookup("INKBOARD_SESSION_TOKEN") {
            config.session_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(value) = lookup("INKBOARD_SAVE_DEBOUNCE_MS") {
            config.save_debounce_ms = parse_number("INKBOARD_SAVE_DEBOUNCE_MS", value)?;
        }
        if let Some(value) = lookup("INKBOARD_HISTORY_LIMIT") {
            config.history_limit = parse_number("INKBOARD_HISTORY_LIMIT", value)?;
        }
        if let Some(dir) = lookup("INKBOARD_DRAFT_DIR") {
            config.draft_dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = lookup("INKBOARD_DRAFTS") {
            config.drafts_enabled = !matches!(value.as_str(), "0" | "false" | "off");
        }
        Ok(config)
    }

    /// Load configuration from a JSON file; missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn saved_display(&self) -> Duration {
        Duration::from_millis(self.saved_display_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}
