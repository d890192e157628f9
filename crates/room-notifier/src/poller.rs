//! One poll cycle: fetch the window, announce unseen bookings, remember them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use shared_types::{event_identity, Appointment};

use crate::audit;
use crate::calendar_client::CalendarSource;
use crate::db::{DedupStore, PruneCounts};
use crate::error::{SourceError, StoreError};
use crate::models::NewEventRecord;
use crate::notifier::{format_message, ChatChannel, Notifier};

/// How far behind `now` the scan window starts, so bookings already under way
/// are still picked up after a late tick.
pub const WINDOW_BACKOFF_MINUTES: i64 = 60;

/// Settings the poll cycle reads on every tick
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub room_id: String,
    pub lookahead: chrono::Duration,
    pub retention: chrono::Duration,
    pub fetch_timeout: Duration,
    pub tz: Tz,
}

/// Everything a cycle needs, passed explicitly instead of living in globals
pub struct AppContext<Src, St, Ch> {
    pub settings: PollSettings,
    pub source: Src,
    pub store: St,
    pub notifier: Notifier<Ch>,
}

/// Outcome counts for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub already_seen: usize,
    pub sent: usize,
    /// Delivery failed after the retry; left for the next cycle
    pub failed: usize,
    /// Dedup lookup failed; left for the next cycle
    pub deferred: usize,
    /// Delivered but not recorded; may be announced again
    pub unrecorded: usize,
    /// Delivered, but the store already held the id and rejected the insert
    pub duplicates: usize,
}

/// Inclusive scan window for a tick at `now`
pub fn scan_window(
    now: DateTime<Utc>,
    lookahead: chrono::Duration,
) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        now - chrono::Duration::minutes(WINDOW_BACKOFF_MINUTES),
        now + lookahead,
    )
}

impl<Src, St, Ch> AppContext<Src, St, Ch>
where
    Src: CalendarSource,
    St: DedupStore,
    Ch: ChatChannel,
{
    pub fn new(settings: PollSettings, source: Src, store: St, notifier: Notifier<Ch>) -> Self {
        Self {
            settings,
            source,
            store,
            notifier,
        }
    }

    /// Run one full fetch-identify-check-notify-mark pass.
    ///
    /// Only a fetch failure aborts the cycle. Per-booking failures are logged
    /// and counted, and the booking is picked up again next cycle.
    pub async fn run_poll_cycle(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, SourceError> {
        let (window_start, window_end) = scan_window(now, self.settings.lookahead);

        let mut appointments = match self.fetch(window_start, window_end).await {
            Ok(appointments) => appointments,
            Err(e) => {
                audit::error(
                    &mut self.store,
                    format!("Failed to fetch bookings for {}: {}", self.settings.room_id, e),
                )
                .await;
                return Err(e);
            }
        };
        // stable, so equal starts keep source order
        appointments.sort_by_key(|a| a.start);

        let mut report = CycleReport {
            fetched: appointments.len(),
            ..Default::default()
        };

        for appointment in &appointments {
            self.process(appointment, now, &mut report).await;
        }

        if report.sent > 0 {
            audit::info(
                &mut self.store,
                format!("Sent {} new booking notification(s) this cycle", report.sent),
            )
            .await;
        } else {
            audit::info(&mut self.store, "No new bookings found this cycle").await;
        }

        Ok(report)
    }

    /// Delete records and log lines older than the retention horizon.
    pub async fn run_retention(&mut self, now: DateTime<Utc>) -> Result<PruneCounts, StoreError> {
        crate::janitor::prune_expired(&mut self.store, now, self.settings.retention).await
    }

    async fn fetch(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, SourceError> {
        let timeout = self.settings.fetch_timeout;
        tokio::time::timeout(
            timeout,
            self.source
                .list_appointments(&self.settings.room_id, window_start, window_end),
        )
        .await
        .map_err(|_| SourceError::Timeout(timeout))?
    }

    async fn process(
        &mut self,
        appointment: &Appointment,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let event_id = event_identity(appointment);
        let title = appointment.title();

        match self.store.exists(&event_id).await {
            Ok(true) => {
                tracing::debug!("Already announced: {} ({})", title, event_id);
                report.already_seen += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                audit::error(
                    &mut self.store,
                    format!("Failed to check booking '{}' ({}): {}", title, event_id, e),
                )
                .await;
                report.deferred += 1;
                return;
            }
        }

        let message = format_message(appointment, self.settings.tz, now);
        if let Err(e) = self.notifier.send(&message).await {
            audit::error(
                &mut self.store,
                format!("Failed to announce booking '{}' after retry: {}", title, e),
            )
            .await;
            report.failed += 1;
            return;
        }

        let record =
            NewEventRecord::from_appointment(event_id, appointment, self.settings.tz, now);
        match self.store.put(&record).await {
            Ok(()) => {
                audit::info(&mut self.store, format!("Sent notification: {}", title)).await;
                report.sent += 1;
            }
            Err(StoreError::Duplicate(id)) => {
                audit::error(
                    &mut self.store,
                    format!(
                        "Announced booking '{}' but the store rejected it as already recorded ({})",
                        title, id
                    ),
                )
                .await;
                report.duplicates += 1;
            }
            Err(e) => {
                audit::error(
                    &mut self.store,
                    format!(
                        "Announced booking '{}' but failed to record it: {}",
                        title, e
                    ),
                )
                .await;
                report.unrecorded += 1;
            }
        }
    }
}
