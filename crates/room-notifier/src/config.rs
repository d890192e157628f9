use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default location of the TOML config file
pub const DEFAULT_CONFIG_PATH: &str = "room-notifier.toml";

/// Environment variable that overrides `telegram.bot_token`
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

// Upper bounds accepted by `Config::validate`
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 24 * 60;
pub const MAX_LOOKAHEAD_HOURS: u64 = 366 * 24;
pub const MAX_RETENTION_DAYS: u64 = 10 * 366;
pub const MAX_CLEANUP_INTERVAL_HOURS: u64 = 366 * 24;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Calendar id of the meeting room (resource calendar address)
    pub room_id: String,

    /// Name this instance identifies itself with in logs and requests
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// How often to scan the room calendar (minutes)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_minutes: u64,

    /// How far ahead of now the scan window reaches (hours)
    #[serde(default = "default_lookahead")]
    pub lookahead_hours: u64,

    /// Age after which processed events and audit logs are purged (days)
    #[serde(default = "default_retention")]
    pub retention_days: u64,

    /// How often the retention sweep runs (hours)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_hours: u64,

    /// Upper bound for a single calendar fetch or chat delivery (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// SQLite database file
    #[serde(default = "default_db_file")]
    pub db_file: String,

    /// IANA time zone used to render booking times in messages
    #[serde(default = "default_timezone")]
    pub timezone: String,

    pub telegram: TelegramConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token; may be supplied through TELEGRAM_BOT_TOKEN instead
    #[serde(default)]
    pub bot_token: String,

    /// Target chat (group ids are negative)
    #[serde(default)]
    pub chat_id: i64,

    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Path to Google OAuth client credentials JSON file
    #[serde(default = "default_credentials")]
    pub credentials_path: String,

    /// Path to store the OAuth token cache
    #[serde(default = "default_token_cache")]
    pub token_cache_path: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials(),
            token_cache_path: default_token_cache(),
        }
    }
}

fn default_session_name() -> String {
    "room_notifier".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_lookahead() -> u64 {
    24
}

fn default_retention() -> u64 {
    30
}

fn default_cleanup_interval() -> u64 {
    24
}

fn default_request_timeout() -> u64 {
    30
}

fn default_db_file() -> String {
    "room_bookings.db".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_credentials() -> String {
    "client_secret.json".to_string()
}

fn default_token_cache() -> String {
    "calendar_token_cache.json".to_string()
}

fn clamped(value: u64, max: u64) -> i64 {
    i64::try_from(value.min(max)).unwrap_or(0)
}

impl Config {
    /// Read and parse the config file, then apply environment overrides.
    ///
    /// The result is not validated; call [`Config::validate`] before use.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.telegram.bot_token = token;
            }
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check every required value. Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.room_id.trim().is_empty() {
            return Err(ConfigError::Missing("room_id"));
        }
        self.validate_bot_token()?;
        if self.telegram.chat_id == 0 {
            return Err(ConfigError::Missing("telegram.chat_id"));
        }
        if self.db_file.trim().is_empty() {
            return Err(ConfigError::Missing("db_file"));
        }

        let bounded = [
            ("poll_interval_minutes", self.poll_interval_minutes, MAX_POLL_INTERVAL_MINUTES),
            ("lookahead_hours", self.lookahead_hours, MAX_LOOKAHEAD_HOURS),
            ("retention_days", self.retention_days, MAX_RETENTION_DAYS),
            ("cleanup_interval_hours", self.cleanup_interval_hours, MAX_CLEANUP_INTERVAL_HOURS),
            ("request_timeout_secs", self.request_timeout_secs, MAX_REQUEST_TIMEOUT_SECS),
        ];
        for (field, value, max) in bounded {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
            if value > max {
                return Err(ConfigError::invalid(field, format!("must be at most {}", max)));
            }
        }

        self.time_zone()?;

        Ok(())
    }

    /// The subset of [`Config::validate`] needed to talk to the Bot API.
    pub fn validate_bot_token(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::Missing("telegram.bot_token"));
        }
        if !self.telegram.bot_token.contains(':') {
            tracing::warn!("telegram.bot_token does not look like a bot token");
        }
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::invalid("timezone", e.to_string()))
    }

    // Accessors clamp to the MAX_* bounds.

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes.min(MAX_POLL_INTERVAL_MINUTES) * 60)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours.min(MAX_CLEANUP_INTERVAL_HOURS) * 3600)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.min(MAX_REQUEST_TIMEOUT_SECS))
    }

    pub fn lookahead(&self) -> chrono::Duration {
        chrono::Duration::hours(clamped(self.lookahead_hours, MAX_LOOKAHEAD_HOURS))
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(clamped(self.retention_days, MAX_RETENTION_DAYS))
    }

    /// Write an example config to `path` unless a file already exists there.
    ///
    /// Returns `true` when a template was written.
    pub fn write_template(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        let rendered = toml::to_string_pretty(&Self::example())?;
        std::fs::write(path, rendered).map_err(|source| ConfigError::Io {
            path: PathBuf::from(path),
            source,
        })?;
        Ok(true)
    }

    pub fn example() -> Self {
        Config {
            room_id: "room@example.com".to_string(),
            session_name: default_session_name(),
            poll_interval_minutes: default_poll_interval(),
            lookahead_hours: default_lookahead(),
            retention_days: default_retention(),
            cleanup_interval_hours: default_cleanup_interval(),
            request_timeout_secs: default_request_timeout(),
            db_file: default_db_file(),
            timezone: default_timezone(),
            telegram: TelegramConfig {
                bot_token: String::new(),
                chat_id: -1000000000000,
                api_base: default_api_base(),
            },
            calendar: CalendarConfig::default(),
        }
    }
}
