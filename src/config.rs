//! Configuration, paths and constants

use crate::error::{Error, Result};
use chrono::FixedOffset;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// All configurable paths and settings
#[derive(Debug, Clone)]
pub struct Config {
    pub state_file: PathBuf,
    pub telegram_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub advisor_temperature: f32,
    pub advisor_max_tokens: u32,
    pub utc_offset_minutes: i32,
    pub reminder_interval_secs: u64,
    pub startup_retries: u32,
    pub startup_backoff_secs: u64,
    pub poll_timeout_secs: u32,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            state_file: home.join(".pressure-assistant").join("state.json"),
            telegram_token: None,
            openai_api_key: None,
            openai_model: "gpt-4o".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            advisor_temperature: 0.7,
            advisor_max_tokens: 700,
            utc_offset_minutes: 180,
            reminder_interval_secs: 60,
            startup_retries: 5,
            startup_backoff_secs: 5,
            poll_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Default config overlaid with environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = env_var("PRESSURE_STATE_FILE") {
            config.state_file = PathBuf::from(path);
        }
        config.telegram_token = env_var("TELEGRAM_BOT_TOKEN");
        config.openai_api_key = env_var("OPENAI_API_KEY");
        if let Some(model) = env_var("OPENAI_MODEL") {
            config.openai_model = model;
        }
        if let Some(url) = env_var("OPENAI_BASE_URL") {
            config.openai_base_url = url;
        }
        if let Some(offset) = env_var("PRESSURE_UTC_OFFSET_MINUTES") {
            config.utc_offset_minutes = offset.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "PRESSURE_UTC_OFFSET_MINUTES must be an integer, got '{}'",
                    offset
                ))
            })?;
        }

        config.timezone()?;
        Ok(config)
    }

    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &Path) -> Self {
        Self {
            state_file: temp_dir.join("state.json"),
            telegram_token: None,
            openai_api_key: None,
            openai_model: "gpt-4o".to_string(),
            openai_base_url: "http://127.0.0.1:9/v1".to_string(),
            advisor_temperature: 0.7,
            advisor_max_tokens: 700,
            utc_offset_minutes: 180,
            reminder_interval_secs: 60,
            startup_retries: 5,
            startup_backoff_secs: 0,
            poll_timeout_secs: 1,
        }
    }

    /// Local timezone as a fixed UTC offset
    pub fn timezone(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            Error::Config(format!(
                "UTC offset out of range: {} minutes",
                self.utc_offset_minutes
            ))
        })
    }

    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_secs)
    }

    pub fn startup_backoff(&self) -> Duration {
        Duration::from_secs(self.startup_backoff_secs)
    }

    pub fn require_telegram_token(&self) -> Result<&str> {
        self.telegram_token
            .as_deref()
            .ok_or_else(|| Error::Config("TELEGRAM_BOT_TOKEN is not set".to_string()))
    }

    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".to_string()))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Readings above either bound trigger an out-of-range warning
pub const WARN_SYSTOLIC_ABOVE: u16 = 140;
pub const WARN_DIASTOLIC_ABOVE: u16 = 90;

/// Advisory dialogue turns kept per user
pub const CHAT_LOG_LIMIT: usize = 10;

/// Dialogue turns quoted back into a new dialogue prompt
pub const PROMPT_CHAT_TURNS: usize = 5;

/// Measurement entries quoted into any prompt
pub const PROMPT_HISTORY_ENTRIES: usize = 10;
