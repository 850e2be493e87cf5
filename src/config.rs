//! Configuration file parser for ~/.config/curator/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos. Credentials may come from the file or from
//! `CURATOR_*` environment variables, which take precedence.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::api::ApiSettings;
use crate::curation::{CurationSettings, DEFAULT_SEED_HANDLES};
use crate::oauth::Credentials;

/// Platform's upper bound on one timeline page.
const MAX_TIMELINE_COUNT: u32 = 200;

/// One week.
const MAX_CURATION_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A credential is absent from both the environment and the config file
    #[error("Missing credential '{key}': set {env} or '{key}' in the config file")]
    MissingCredential { key: &'static str, env: &'static str },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// The custom Debug impl masks the four credentials.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minutes between curation firings.
    pub curation_interval_minutes: u64,

    /// Recent posts fetched per source scan.
    pub timeline_count: u32,

    /// Posts kept per source scan.
    pub top_k: usize,

    /// Handles resolved into sources when the database has none.
    pub seed_handles: Vec<String>,

    pub api_base_url: String,
    pub upload_base_url: String,
    pub weather_base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,

    /// Quote image renderer: program followed by its arguments.
    pub render_command: Vec<String>,

    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub access_token: Option<String>,
    pub access_token_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            curation_interval_minutes: 5,
            timeline_count: crate::ranking::DEFAULT_TIMELINE_COUNT,
            top_k: crate::ranking::DEFAULT_TOP_K,
            seed_handles: DEFAULT_SEED_HANDLES.iter().map(|h| h.to_string()).collect(),
            api_base_url: "https://api.twitter.com".to_string(),
            upload_base_url: "https://upload.twitter.com".to_string(),
            weather_base_url: "https://api.ipma.pt".to_string(),
            user_agent: concat!("curator/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
            render_command: Vec::new(),
            consumer_key: None,
            consumer_secret: None,
            access_token: None,
            access_token_secret: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Config")
            .field("curation_interval_minutes", &self.curation_interval_minutes)
            .field("timeline_count", &self.timeline_count)
            .field("top_k", &self.top_k)
            .field("seed_handles", &self.seed_handles.len())
            .field("api_base_url", &self.api_base_url)
            .field("upload_base_url", &self.upload_base_url)
            .field("weather_base_url", &self.weather_base_url)
            .field("user_agent", &self.user_agent)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("render_command", &self.render_command)
            .field("consumer_key", &redact(&self.consumer_key))
            .field("consumer_secret", &redact(&self.consumer_secret))
            .field("access_token", &redact(&self.access_token))
            .field("access_token_secret", &redact(&self.access_token_secret))
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 14] = [
        "curation_interval_minutes",
        "timeline_count",
        "top_k",
        "seed_handles",
        "api_base_url",
        "upload_base_url",
        "weather_base_url",
        "user_agent",
        "request_timeout_secs",
        "render_command",
        "consumer_key",
        "consumer_secret",
        "access_token",
        "access_token_secret",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to bound memory use
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(path = %path.display(), sources = config.seed_handles.len(), "Loaded configuration");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.curation_interval_minutes == 0
            || self.curation_interval_minutes > MAX_CURATION_INTERVAL_MINUTES
        {
            return Err(ConfigError::Invalid(format!(
                "curation_interval_minutes must be between 1 and {}",
                MAX_CURATION_INTERVAL_MINUTES
            )));
        }
        if self.timeline_count == 0 || self.timeline_count > MAX_TIMELINE_COUNT {
            return Err(ConfigError::Invalid(format!(
                "timeline_count must be between 1 and {}",
                MAX_TIMELINE_COUNT
            )));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn curation_interval(&self) -> Duration {
        Duration::from_secs(self.curation_interval_minutes * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            api_base_url: self.api_base_url.clone(),
            upload_base_url: self.upload_base_url.clone(),
            user_agent: self.user_agent.clone(),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn curation_settings(&self) -> CurationSettings {
        CurationSettings {
            timeline_count: self.timeline_count,
            top_k: self.top_k,
        }
    }

    /// Resolve the four OAuth credentials; environment variables win over
    /// the file. Any missing or blank credential is fatal.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        self.credentials_from(|name| std::env::var(name).ok())
    }

    fn credentials_from(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Credentials, ConfigError> {
        let pick = |key: &'static str, env_name: &'static str, file: &Option<String>| {
            env(env_name)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file.clone().filter(|v| !v.trim().is_empty()))
                .map(SecretString::from)
                .ok_or(ConfigError::MissingCredential { key, env: env_name })
        };

        Ok(Credentials {
            consumer_key: pick("consumer_key", "CURATOR_CONSUMER_KEY", &self.consumer_key)?,
            consumer_secret: pick(
                "consumer_secret",
                "CURATOR_CONSUMER_SECRET",
                &self.consumer_secret,
            )?,
            access_token: pick("access_token", "CURATOR_ACCESS_TOKEN", &self.access_token)?,
            access_token_secret: pick(
                "access_token_secret",
                "CURATOR_ACCESS_TOKEN_SECRET",
                &self.access_token_secret,
            )?,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
