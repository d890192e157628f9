use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod identity;

pub use identity::{event_identity, NO_SUBJECT};

/// A booking as reported by the calendar source.
///
/// Appointments are fetched fresh on every poll cycle and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub subject: Option<String>,
    /// Thread topic of the meeting; preferred over `subject` when present
    pub conversation_topic: Option<String>,
    pub organizer: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub body: Option<String>,
}

impl Appointment {
    /// Topic if present, otherwise subject, otherwise the placeholder.
    pub fn title(&self) -> &str {
        non_blank(self.conversation_topic.as_deref())
            .or_else(|| non_blank(self.subject.as_deref()))
            .unwrap_or(NO_SUBJECT)
    }

    pub fn location(&self) -> Option<&str> {
        non_blank(self.location.as_deref())
    }

    pub fn body(&self) -> Option<&str> {
        non_blank(self.body.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// EventRecord struct matching `processed_events` column order exactly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct EventRecord {
    pub event_id: String,
    pub subject: String,
    pub organizer: String,
    pub start_time: String, // "HH:MM" in the display time zone
    pub end_time: String,
    pub event_date: String, // "YYYY-MM-DD"
    pub location: String,
    pub processed_time: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

/// LogEntry struct matching `logs` column order exactly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct LogEntry {
    pub id: i64,
    pub log_type: String, // stored as TEXT: "INFO", "WARN", "ERROR"
    pub message: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(LogLevel::Info),
            "WARN" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }
}
