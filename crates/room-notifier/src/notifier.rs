//! Message formatting and delivery with a single reconnect-and-retry.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use shared_types::Appointment;

use crate::error::ChannelError;

/// Shown when a booking carries no room or location text
pub const NO_LOCATION: &str = "(no location)";

/// Transport for chat messages.
///
/// Implementations own their connection state; the [`Notifier`] decides when
/// to connect, disconnect and retry.
#[allow(async_fn_in_trait)]
pub trait ChatChannel {
    async fn connect(&mut self) -> Result<(), ChannelError>;

    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    async fn deliver(&mut self, target: &str, text: &str) -> Result<(), ChannelError>;
}

pub struct Notifier<C> {
    channel: C,
    target: String,
    timeout: Duration,
}

impl<C: ChatChannel> Notifier<C> {
    pub fn new(channel: C, target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            channel,
            target: target.into(),
            timeout,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Deliver `message`, reconnecting and resending once on failure.
    ///
    /// An `Err` means neither attempt was confirmed and the booking must not
    /// be marked as announced.
    pub async fn send(&mut self, message: &str) -> Result<(), ChannelError> {
        let first = match self.attempt(message).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        tracing::warn!("Message delivery failed, reconnecting once: {}", first);

        if self.channel.is_connected() {
            self.channel.disconnect().await;
        }
        self.attempt(message).await
    }

    /// Release the channel connection.
    pub async fn shutdown(&mut self) {
        if self.channel.is_connected() {
            self.channel.disconnect().await;
        }
    }

    async fn attempt(&mut self, message: &str) -> Result<(), ChannelError> {
        if !self.channel.is_connected() {
            tokio::time::timeout(self.timeout, self.channel.connect())
                .await
                .map_err(|_| ChannelError::Timeout(self.timeout))??;
        }
        tokio::time::timeout(self.timeout, self.channel.deliver(&self.target, message))
            .await
            .map_err(|_| ChannelError::Timeout(self.timeout))?
    }
}

/// Render the announcement for a booking.
///
/// Times are shown in `tz`; the date is labelled relative to `now` in the same
/// zone.
pub fn format_message(appointment: &Appointment, tz: Tz, now: DateTime<Utc>) -> String {
    let start = appointment.start.with_timezone(&tz);
    let end = appointment.end.with_timezone(&tz);
    let today = now.with_timezone(&tz).date_naive();

    let mut message = format!(
        "🔔 Room booking notice\n\n\
         📍 Room: {}\n\
         📅 Date: {}\n\
         🕒 Time: {} - {}\n\
         📝 Subject: {}\n\
         👤 Organizer: {}",
        appointment.location().unwrap_or(NO_LOCATION),
        date_label(start.date_naive(), today),
        start.format("%H:%M"),
        end.format("%H:%M"),
        appointment.title(),
        appointment.organizer,
    );

    if let Some(body) = appointment.body() {
        message.push_str("\n\n");
        message.push_str(body);
    }

    message
}

/// "today", "tomorrow", or a month/day label such as "Oct 19 (Mon)"
pub fn date_label(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        _ => date.format("%b %-d (%a)").to_string(),
    }
}
