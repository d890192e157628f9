// Database models for Diesel
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use diesel::prelude::*;
use shared_types::{Appointment, LogLevel};

/// Insertable struct for a booking that has been announced
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::processed_events)]
pub struct NewEventRecord {
    pub event_id: String,
    pub subject: String,
    pub organizer: String,
    pub start_time: String,
    pub end_time: String,
    pub event_date: String,
    pub location: String,
    pub processed_time: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

impl NewEventRecord {
    /// Build the record for `appointment`, rendering times in `tz`.
    pub fn from_appointment(
        event_id: String,
        appointment: &Appointment,
        tz: Tz,
        now: DateTime<Utc>,
    ) -> Self {
        let start = appointment.start.with_timezone(&tz);
        let end = appointment.end.with_timezone(&tz);
        Self {
            event_id,
            subject: appointment.title().to_string(),
            organizer: appointment.organizer.clone(),
            start_time: start.format("%H:%M").to_string(),
            end_time: end.format("%H:%M").to_string(),
            event_date: start.format("%Y-%m-%d").to_string(),
            location: appointment.location().unwrap_or_default().to_string(),
            processed_time: now.naive_utc(),
            created_at: now.naive_utc(),
        }
    }
}

/// Insertable struct for audit log lines
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::logs)]
pub struct NewLogEntry {
    pub log_type: String,
    pub message: String,
    pub created_at: NaiveDateTime,
}

impl NewLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            log_type: level.as_str().to_string(),
            message: message.into(),
            created_at: at.naive_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_renders_local_times() {
        let appointment = Appointment {
            subject: None,
            conversation_topic: Some("Hiring loop".to_string()),
            organizer: "dana@example.com".to_string(),
            start: Utc.with_ymd_and_hms(2026, 10, 17, 23, 30, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 10, 18, 0, 30, 0).unwrap(),
            location: None,
            body: None,
        };
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        let record = NewEventRecord::from_appointment(
            "abc".to_string(),
            &appointment,
            chrono_tz::Asia::Shanghai,
            now,
        );

        assert_eq!(record.subject, "Hiring loop");
        assert_eq!(record.start_time, "07:30");
        assert_eq!(record.end_time, "08:30");
        assert_eq!(record.event_date, "2026-10-18");
        assert_eq!(record.location, "");
        assert_eq!(record.created_at, now.naive_utc());
    }
}
