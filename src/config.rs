use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment name that does not get an `x-env` header.
pub const PRODUCTION_ENV: &str = "prod";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cursor: CursorConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Request timeout; unset means the HTTP client default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ApiConfig {
    /// The `x-env` value to send, if any.
    pub fn env_header(&self) -> Option<&str> {
        if self.environment == PRODUCTION_ENV {
            None
        } else {
            Some(self.environment.as_str())
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            environment: default_environment(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CursorConfig {
    #[serde(default = "default_cursor_path")]
    pub path: PathBuf,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            path: default_cursor_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_environment() -> String {
    PRODUCTION_ENV.to_string()
}

fn default_cursor_path() -> PathBuf {
    PathBuf::from(".cache").join("pf-cache.json")
}

fn default_history_limit() -> usize {
    5
}

fn default_channel_capacity() -> usize {
    64
}

impl Config {
    /// Load from `path` (a missing file means defaults), apply environment
    /// overrides, then validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production; tests pass a map.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = set("API_URL") {
            self.api.url = url;
        }
        if let Some(token) = set("API_TOKEN") {
            self.api.token = token;
        }
        if let Some(environment) = set("API_ENV") {
            self.api.environment = environment;
        }
        if let Some(path) = set("CURSOR_PATH") {
            self.cursor.path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.url.trim().is_empty() || self.api.token.trim().is_empty() {
            anyhow::bail!("API_URL and API_TOKEN must be set");
        }
        if self.feed.channel_capacity == 0 {
            anyhow::bail!("feed.channel_capacity must be greater than zero");
        }
        Ok(())
    }
}
