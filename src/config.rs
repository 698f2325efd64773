//! Configuration for the reporter.
use serde;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const CONFIG_PATH_ENV: &str = "BITNODES_REPORTER_CONFIG";
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const CHAT_ID_ENV: &str = "TELEGRAM_CHAT_ID";

#[derive(Debug, serde::Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Bitnodes endpoint returning the latest snapshot
    pub census_url: String,

    /// Base of the Telegram bot API, the token and method are appended to it
    pub telegram_api_base: String,

    /// Where the last observation is kept between cycles
    pub state_path: String,

    /// The interval in seconds between two reports
    pub report_interval_sec: u64,

    /// How many countries get their own line, the rest is folded into "Others"
    pub top_n: usize,

    /// The maximum time in milliseconds any single HTTP request may take
    pub max_http_timeout_ms: u64,

    /// Telegram caps a message at 4096 characters
    pub max_message_chars: usize,

    pub timezone: TimezoneConfig,
}

#[derive(Debug, serde::Deserialize, Clone)]
#[serde(default)]
/// Fixed offset used to render the report header.
/// Defaults to Pakistan Standard Time, which has no daylight saving.
pub struct TimezoneConfig {
    pub utc_offset_minutes: i32,
    pub label: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            census_url: "https://bitnodes.io/api/v1/snapshots/latest/".into(),
            telegram_api_base: "https://api.telegram.org".into(),
            state_path: "state.json".into(),
            report_interval_sec: 30 * 60,
            top_n: 15,
            max_http_timeout_ms: 30_000,
            max_message_chars: 4_000,
            timezone: TimezoneConfig::default(),
        }
    }
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        TimezoneConfig {
            utc_offset_minutes: 5 * 60,
            label: "PKT".into(),
        }
    }
}

impl Config {
    /// Load the configuration from a json file.
    /// A missing file means "all defaults", a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }

        let config_data = fs::read_to_string(path)
            .map_err(|err| format!("Failed to read config file {}: {}", path.display(), err))?;

        let config: Config = serde_json::from_str(&config_data)
            .map_err(|err| format!("Failed to parse config file {}: {}", path.display(), err))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        url::Url::parse(&self.census_url)
            .map_err(|err| format!("census_url is not a valid url: {}", err))?;
        url::Url::parse(&self.telegram_api_base)
            .map_err(|err| format!("telegram_api_base is not a valid url: {}", err))?;

        if self.top_n == 0 {
            return Err("top_n must be at least 1".into());
        }
        if self.report_interval_sec == 0 {
            return Err("report_interval_sec must be at least 1".into());
        }
        if self.max_message_chars == 0 {
            return Err("max_message_chars must be at least 1".into());
        }
        let offset = self
            .timezone
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(chrono::FixedOffset::east_opt);
        if offset.is_none() {
            return Err(format!(
                "timezone.utc_offset_minutes {} is out of range",
                self.timezone.utc_offset_minutes
            ));
        }
        Ok(())
    }
}

/// Secrets are only ever read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub bot_token: String,
    pub chat_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        match (read(BOT_TOKEN_ENV), read(CHAT_ID_ENV)) {
            (Some(bot_token), Some(chat_id)) => Ok(Credentials { bot_token, chat_id }),
            _ => Err(format!("Set {} and {} env vars.", BOT_TOKEN_ENV, CHAT_ID_ENV)),
        }
    }
}
