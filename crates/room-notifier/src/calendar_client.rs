use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use google_calendar3::api::{Event, EventDateTime, Scope};
use google_calendar3::hyper_rustls::HttpsConnector;
use google_calendar3::CalendarHub;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use shared_types::Appointment;
use std::path::Path;

use crate::config::CalendarConfig;
use crate::error::SourceError;

const PAGE_SIZE: i32 = 250;

/// Lists the bookings of a room calendar.
#[allow(async_fn_in_trait)]
pub trait CalendarSource {
    /// Appointments with `start >= window_start` and `end <= window_end`,
    /// sorted by start ascending.
    async fn list_appointments(
        &self,
        room_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, SourceError>;
}

/// Client for reading a room's resource calendar through the Google Calendar API
pub struct GoogleCalendarSource {
    hub: CalendarHub<HttpsConnector<HttpConnector>>,
    tz: Tz,
}

impl GoogleCalendarSource {
    /// `tz` anchors all-day bookings, which carry a date but no time.
    pub async fn new(config: &CalendarConfig, tz: Tz) -> Result<Self, SourceError> {
        let secret =
            google_calendar3::yup_oauth2::read_application_secret(&config.credentials_path)
                .await
                .map_err(|e| {
                    SourceError::Auth(format!(
                        "Failed to read OAuth credentials {}: {}",
                        config.credentials_path, e
                    ))
                })?;

        let auth = google_calendar3::yup_oauth2::InstalledFlowAuthenticator::builder(
            secret,
            google_calendar3::yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(Path::new(&config.token_cache_path))
        .build()
        .await
        .map_err(|e| SourceError::Auth(format!("Failed to build authenticator: {}", e)))?;

        let connector = google_calendar3::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| SourceError::Api(format!("Failed to load native TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        let hub = CalendarHub::new(client, auth);

        Ok(Self { hub, tz })
    }
}

impl CalendarSource for GoogleCalendarSource {
    async fn list_appointments(
        &self,
        room_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, SourceError> {
        let mut appointments = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self
                .hub
                .events()
                .list(room_id)
                .time_min(window_start)
                .time_max(window_end)
                .single_events(true)
                .order_by("startTime")
                .max_results(PAGE_SIZE)
                .add_scope(Scope::Readonly);
            if let Some(ref token) = page_token {
                call = call.page_token(token);
            }

            let (_, events) = call
                .doit()
                .await
                .map_err(|e| SourceError::Api(format!("Failed to list events: {}", e)))?;

            for event in events.items.unwrap_or_default() {
                if let Some(appointment) = to_appointment(event, self.tz) {
                    appointments.push(appointment);
                }
            }

            match events.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        let mut appointments = within_window(appointments, window_start, window_end);
        appointments.sort_by_key(|a| a.start);

        tracing::debug!(
            "Fetched {} appointments for {} between {} and {}",
            appointments.len(),
            room_id,
            window_start,
            window_end
        );
        Ok(appointments)
    }
}

/// Keep appointments that lie entirely inside the inclusive window
pub fn within_window(
    appointments: Vec<Appointment>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<Appointment> {
    appointments
        .into_iter()
        .filter(|a| a.start >= window_start && a.end <= window_end)
        .collect()
}

fn to_appointment(event: Event, tz: Tz) -> Option<Appointment> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let start = event_time(event.start.as_ref()?, tz)?;
    let end = event_time(event.end.as_ref()?, tz)?;
    let organizer = event
        .organizer
        .and_then(|o| o.email.or(o.display_name))
        .unwrap_or_else(|| "(unknown organizer)".to_string());

    Some(Appointment {
        subject: event.summary,
        conversation_topic: None,
        organizer,
        start,
        end,
        location: event.location,
        body: event.description,
    })
}

fn event_time(value: &EventDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    if let Some(date_time) = value.date_time {
        return Some(date_time);
    }
    value.date.and_then(|date| local_midnight(date, tz))
}

fn local_midnight(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_calendar3::api::EventOrganizer;

    fn timed(start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event {
            summary: Some("Retro".to_string()),
            location: Some("Room 2".to_string()),
            organizer: Some(EventOrganizer {
                email: Some("frank@example.com".to_string()),
                display_name: Some("Frank".to_string()),
                ..Default::default()
            }),
            start: Some(EventDateTime {
                date_time: Some(start),
                ..Default::default()
            }),
            end: Some(EventDateTime {
                date_time: Some(end),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_timed_event_maps_fields() {
        let start = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap();
        let appt = to_appointment(timed(start, end), chrono_tz::UTC).expect("should map");

        assert_eq!(appt.subject.as_deref(), Some("Retro"));
        assert_eq!(appt.organizer, "frank@example.com");
        assert_eq!(appt.start, start);
        assert_eq!(appt.end, end);
        assert_eq!(appt.location.as_deref(), Some("Room 2"));
    }

    #[test]
    fn test_cancelled_event_dropped() {
        let start = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap();
        let mut event = timed(start, start + chrono::Duration::hours(1));
        event.status = Some("cancelled".to_string());
        assert!(to_appointment(event, chrono_tz::UTC).is_none());
    }

    #[test]
    fn test_all_day_event_uses_local_midnight() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let event = Event {
            summary: Some("Offsite".to_string()),
            start: Some(EventDateTime {
                date: Some(date),
                ..Default::default()
            }),
            end: Some(EventDateTime {
                date: date.succ_opt(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let appt = to_appointment(event, chrono_tz::Asia::Shanghai).expect("should map");
        assert_eq!(appt.start, Utc.with_ymd_and_hms(2026, 10, 17, 16, 0, 0).unwrap());
        assert_eq!(appt.organizer, "(unknown organizer)");
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let window_start = Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap();
        let window_end = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let hour = chrono::Duration::hours(1);

        let make = |start: DateTime<Utc>, end: DateTime<Utc>| {
            to_appointment(timed(start, end), chrono_tz::UTC).expect("should map")
        };
        let appointments = vec![
            make(window_start, window_start + hour),
            make(window_end - hour, window_end),
            make(window_start - hour, window_start + hour),
            make(window_end - hour, window_end + hour),
        ];

        let kept = within_window(appointments, window_start, window_end);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].start, window_start);
        assert_eq!(kept[1].end, window_end);
    }
}
