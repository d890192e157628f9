//! Error taxonomy for the notifier service.
//!
//! Only [`ConfigError`] is fatal. The other three are recovered at the
//! smallest enclosing boundary: a [`SourceError`] aborts the current poll
//! cycle, a [`ChannelError`] or [`StoreError`] defers a single booking to the
//! next cycle.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Invalid or missing configuration, raised before any connection is opened
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to render config template: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Missing required config value: {0}")]
    Missing(&'static str),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// The calendar source could not produce the appointment list
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Calendar request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Calendar authentication failed: {0}")]
    Auth(String),

    #[error("Calendar API error: {0}")]
    Api(String),
}

/// The chat channel could not deliver a message
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel is not connected")]
    NotConnected,

    #[error("Channel request timed out after {0:?}")]
    Timeout(Duration),

    /// The wrapped error never carries the request URL, which embeds the bot token.
    #[error("Channel transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Channel rejected request ({code}): {description}")]
    Rejected { code: i64, description: String },
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        ChannelError::Transport(e.without_url())
    }
}

/// The dedup store could not answer or record
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Store query failed: {0}")]
    Query(#[from] diesel::result::Error),

    /// The event id is already recorded. Never a successful put.
    #[error("Event {0} is already recorded")]
    Duplicate(String),
}
