//! Stable identities for appointments.
//!
//! The identity is a SHA-256 digest over the semantic fields of a booking, so
//! the same booking fetched again on a later cycle (or after a restart) maps to
//! the same key while any edit to its time, organizer, location or title maps to
//! a new one.
//!
//! The encoding is part of the persisted dedup history. Changing it orphans
//! every stored identity and needs a migration of `processed_events`.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::Appointment;

/// Title used when an appointment has neither a topic nor a subject.
pub const NO_SUBJECT: &str = "(no subject)";

// ASCII unit separator between fields
const FIELD_SEPARATOR: u8 = 0x1f;

/// Derive the dedup key for an appointment as 64 lowercase hex characters.
pub fn event_identity(appointment: &Appointment) -> String {
    let start = canonical_time(&appointment.start);
    let end = canonical_time(&appointment.end);
    let fields = [
        appointment.title(),
        start.as_str(),
        end.as_str(),
        appointment.organizer.as_str(),
        appointment.location().unwrap_or(""),
    ];

    let mut hasher = Sha256::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            hasher.update([FIELD_SEPARATOR]);
        }
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn canonical_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn appointment() -> Appointment {
        Appointment {
            subject: Some("Design review".to_string()),
            conversation_topic: None,
            organizer: "bob@example.com".to_string(),
            start: Utc.with_ymd_and_hms(2026, 10, 18, 14, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 10, 18, 15, 30, 0).unwrap(),
            location: Some("Room 3A".to_string()),
            body: Some("Agenda attached".to_string()),
        }
    }

    #[test]
    fn test_identity_is_deterministic() {
        let appt = appointment();
        let first = event_identity(&appt);
        assert_eq!(first, event_identity(&appt.clone()));
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_identity_stable_across_time_zones() {
        let parse = |s: &str| DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc);

        let mut utc = appointment();
        utc.start = parse("2026-10-18T14:00:00Z");
        utc.end = parse("2026-10-18T15:30:00Z");

        let mut shanghai = appointment();
        shanghai.start = parse("2026-10-18T22:00:00+08:00");
        shanghai.end = parse("2026-10-18T23:30:00+08:00");

        let mut new_york = appointment();
        new_york.start = parse("2026-10-18T10:00:00-04:00");
        new_york.end = parse("2026-10-18T11:30:00-04:00");

        assert_eq!(event_identity(&utc), event_identity(&shanghai));
        assert_eq!(event_identity(&utc), event_identity(&new_york));
    }

    #[test]
    fn test_start_shift_changes_identity() {
        let appt = appointment();
        let mut moved = appt.clone();
        moved.start = moved.start + Duration::minutes(1);
        assert_ne!(event_identity(&appt), event_identity(&moved));
    }

    #[test]
    fn test_each_semantic_field_changes_identity() {
        let base = event_identity(&appointment());

        let mut changed = appointment();
        changed.end = changed.end + Duration::minutes(15);
        assert_ne!(base, event_identity(&changed));

        let mut changed = appointment();
        changed.organizer = "carol@example.com".to_string();
        assert_ne!(base, event_identity(&changed));

        let mut changed = appointment();
        changed.location = Some("Room 4B".to_string());
        assert_ne!(base, event_identity(&changed));

        let mut changed = appointment();
        changed.subject = Some("Design review (moved)".to_string());
        assert_ne!(base, event_identity(&changed));
    }

    #[test]
    fn test_body_does_not_affect_identity() {
        let mut changed = appointment();
        changed.body = Some("Updated agenda".to_string());
        assert_eq!(event_identity(&appointment()), event_identity(&changed));
    }

    #[test]
    fn test_topic_takes_precedence_over_subject() {
        let mut with_topic = appointment();
        with_topic.conversation_topic = Some("Architecture".to_string());

        let mut other_subject = with_topic.clone();
        other_subject.subject = Some("Something else".to_string());

        assert_eq!(event_identity(&with_topic), event_identity(&other_subject));
    }

    #[test]
    fn test_missing_title_uses_placeholder() {
        let mut untitled = appointment();
        untitled.subject = None;

        let mut placeholder = appointment();
        placeholder.subject = Some(NO_SUBJECT.to_string());

        assert_eq!(event_identity(&untitled), event_identity(&placeholder));
    }
}
