//! Operational log that lands both in tracing output and in the `logs` table.

use chrono::Utc;
use shared_types::LogLevel;

use crate::db::DedupStore;
use crate::models::NewLogEntry;

/// Emit `message` at `level` and append it to the audit log.
///
/// A failed insert is reported through tracing only; it never interrupts the
/// caller.
pub async fn record<S: DedupStore>(store: &mut S, level: LogLevel, message: impl Into<String>) {
    let message = message.into();
    match level {
        LogLevel::Info => tracing::info!("{}", message),
        LogLevel::Warn => tracing::warn!("{}", message),
        LogLevel::Error => tracing::error!("{}", message),
    }

    let entry = NewLogEntry::new(level, message, Utc::now());
    if let Err(e) = store.append_log(&entry).await {
        tracing::warn!("Failed to write audit log entry: {}", e);
    }
}

pub async fn info<S: DedupStore>(store: &mut S, message: impl Into<String>) {
    record(store, LogLevel::Info, message).await
}

pub async fn warn<S: DedupStore>(store: &mut S, message: impl Into<String>) {
    record(store, LogLevel::Warn, message).await
}

pub async fn error<S: DedupStore>(store: &mut S, message: impl Into<String>) {
    record(store, LogLevel::Error, message).await
}
