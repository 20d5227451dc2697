//! Run configuration: credentials from the environment and tunables from an
//! optional YAML settings file.
//!
//! Credentials are read once at startup into [`Credentials`] and passed by
//! reference to the components that need them. Everything else lives in
//! [`Settings`], whose fields all have defaults so that the settings file is
//! optional and may be partial:
//!
//! ```yaml
//! news_api_url: https://newsapi.org/v2/everything
//! openrouter_url: https://openrouter.ai/api/v1/chat/completions
//! model: meta-llama/llama-2-70b-chat
//! timeout_secs: 30
//! max_retries: 2
//! request_interval_ms: 2000
//! daily_quota: 100
//! lookback_days: 7
//! ```

use crate::error::AppError;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

pub const NEWS_API_KEY_VAR: &str = "NEWS_API_KEY";
pub const OPENROUTER_API_KEY_VAR: &str = "OPENROUTER_API_KEY";
pub const OPENROUTER_MODEL_VAR: &str = "OPENROUTER_MODEL";

pub const DEFAULT_MODEL: &str = "meta-llama/llama-2-70b-chat";
pub const DEFAULT_NEWS_API_URL: &str = "https://newsapi.org/v2/everything";
pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Widest publication-date window accepted from the settings file.
pub const MAX_LOOKBACK_DAYS: i64 = 365;

/// API keys and the model identifier for one run.
#[derive(Clone)]
pub struct Credentials {
    pub news_api_key: String,
    pub openrouter_api_key: String,
    /// Set only when `OPENROUTER_MODEL` is present; otherwise the settings
    /// file (or the built-in default) decides.
    pub model_override: Option<String>,
}

// Keys must never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("news_api_key", &"<redacted>")
            .field("openrouter_api_key", &"<redacted>")
            .field("model_override", &self.model_override)
            .finish()
    }
}

impl Credentials {
    /// Load credentials through a variable lookup, normally `std::env::var`.
    ///
    /// Blank values count as missing. `NEWS_API_KEY` is checked before
    /// `OPENROUTER_API_KEY`, so the error names the first absent variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let news_api_key = non_blank(NEWS_API_KEY_VAR).ok_or(AppError::MissingCredential {
            var: NEWS_API_KEY_VAR,
        })?;
        let openrouter_api_key =
            non_blank(OPENROUTER_API_KEY_VAR).ok_or(AppError::MissingCredential {
                var: OPENROUTER_API_KEY_VAR,
            })?;
        let model_override = non_blank(OPENROUTER_MODEL_VAR).map(|m| m.trim().to_string());

        info!("API keys validated");
        Ok(Self {
            news_api_key,
            openrouter_api_key,
            model_override,
        })
    }
}

/// Tunables that are not secrets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// NewsAPI `everything` endpoint.
    pub news_api_url: String,
    /// OpenRouter chat-completions endpoint.
    pub openrouter_url: String,
    /// Model used when `OPENROUTER_MODEL` is unset.
    pub model: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Extra attempts for transient model-call failures.
    pub max_retries: usize,
    /// First backoff delay; doubles on each retry.
    pub retry_base_delay_ms: u64,
    /// Pause between consecutive model calls.
    pub request_interval_ms: u64,
    /// News requests allowed per day (NewsAPI free tier).
    pub daily_quota: u32,
    /// Size of the publication-date window, in days back from today.
    pub lookback_days: i64,
    /// Sampling temperature for the model.
    pub temperature: f32,
    /// Completion length cap.
    pub max_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            news_api_url: DEFAULT_NEWS_API_URL.to_string(),
            openrouter_url: DEFAULT_OPENROUTER_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 30,
            max_retries: 2,
            retry_base_delay_ms: 1000,
            request_interval_ms: 2000,
            daily_quota: 100,
            lookback_days: 7,
            temperature: 0.3,
            max_tokens: 500,
        }
    }
}

impl Settings {
    /// Read settings from a YAML file, or fall back to defaults when no path is given.
    #[instrument(level = "info", skip_all)]
    pub async fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))?;
        let settings = Self::from_yaml(&raw)?;
        info!(path = %path.display(), "Loaded settings file");
        Ok(settings)
    }

    /// Decode and validate settings from YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self, AppError> {
        // An empty document decodes to unit, not to a map.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings =
            serde_yaml::from_str(raw).map_err(|e| AppError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), AppError> {
        for (name, value) in [
            ("news_api_url", &self.news_api_url),
            ("openrouter_url", &self.openrouter_url),
        ] {
            Url::parse(value).map_err(|e| AppError::Config(format!("{name}: {e}")))?;
        }
        if self.model.trim().is_empty() {
            return Err(AppError::Config("model must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(AppError::Config("timeout_secs must be positive".to_string()));
        }
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.lookback_days) {
            return Err(AppError::Config(format!(
                "lookback_days must be between 1 and {MAX_LOOKBACK_DAYS}"
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The model to use: the environment override wins over the settings file.
    pub fn resolve_model(&self, credentials: &Credentials) -> String {
        credentials
            .model_override
            .clone()
            .unwrap_or_else(|| self.model.clone())
    }
}
