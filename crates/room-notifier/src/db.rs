//! Dedup store backed by SQLite.
//!
//! Holds one row per announced booking in `processed_events` and the
//! append-only audit trail in `logs`. The service is the only writer, so a
//! single connection is shared by the poll cycle and the retention sweep.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, RunQueryDsl, SimpleAsyncConnection};
use shared_types::{EventRecord, LogEntry};

use crate::error::StoreError;
use crate::models::{NewEventRecord, NewLogEntry};

pub type DbConnection = SyncConnectionWrapper<SqliteConnection>;

/// Table definitions. Applied on every open; existing tables are kept.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS processed_events (
    event_id TEXT PRIMARY KEY NOT NULL,
    subject TEXT NOT NULL,
    organizer TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    event_date TEXT NOT NULL,
    location TEXT NOT NULL DEFAULT '',
    processed_time TIMESTAMP NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    log_type TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_processed_events_created_at ON processed_events (created_at);
CREATE INDEX IF NOT EXISTS idx_logs_created_at ON logs (created_at);
"#;

/// Rows removed by a retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneCounts {
    pub events: usize,
    pub logs: usize,
}

impl PruneCounts {
    pub fn total(&self) -> usize {
        self.events + self.logs
    }
}

/// Durable record of which bookings have been announced.
///
/// `put` must only be called after delivery was confirmed, and must fail with
/// [`StoreError::Duplicate`] when the id is already present.
#[allow(async_fn_in_trait)]
pub trait DedupStore {
    async fn exists(&mut self, event_id: &str) -> Result<bool, StoreError>;

    async fn put(&mut self, record: &NewEventRecord) -> Result<(), StoreError>;

    /// Delete events and log lines whose `created_at` is strictly before `cutoff`.
    async fn prune(&mut self, cutoff: NaiveDateTime) -> Result<PruneCounts, StoreError>;

    async fn append_log(&mut self, entry: &NewLogEntry) -> Result<(), StoreError>;
}

pub struct SqliteStore {
    conn: DbConnection,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// `":memory:"` gives a private in-memory store.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let mut conn = DbConnection::establish(path).await?;
        conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
            .await?;
        conn.batch_execute(SCHEMA).await?;
        tracing::debug!("Opened dedup store at {}", path);
        Ok(Self { conn })
    }

    pub async fn get(&mut self, id: &str) -> Result<Option<EventRecord>, StoreError> {
        use crate::schema::processed_events::dsl::*;

        let record = processed_events
            .filter(event_id.eq(id))
            .first::<EventRecord>(&mut self.conn)
            .await
            .optional()?;

        Ok(record)
    }

    pub async fn list_events(&mut self) -> Result<Vec<EventRecord>, StoreError> {
        use crate::schema::processed_events::dsl::*;

        let records = processed_events
            .order_by(created_at.asc())
            .load::<EventRecord>(&mut self.conn)
            .await?;

        Ok(records)
    }

    /// Most recent audit lines, newest first
    pub async fn recent_logs(&mut self, limit: i64) -> Result<Vec<LogEntry>, StoreError> {
        use crate::schema::logs::dsl::*;

        let entries = logs
            .order_by(id.desc())
            .limit(limit)
            .load::<LogEntry>(&mut self.conn)
            .await?;

        Ok(entries)
    }
}

impl DedupStore for SqliteStore {
    async fn exists(&mut self, id: &str) -> Result<bool, StoreError> {
        use crate::schema::processed_events::dsl::*;

        let count: i64 = processed_events
            .filter(event_id.eq(id))
            .count()
            .get_result(&mut self.conn)
            .await?;

        Ok(count > 0)
    }

    async fn put(&mut self, record: &NewEventRecord) -> Result<(), StoreError> {
        use crate::schema::processed_events::dsl::*;

        let result = diesel::insert_into(processed_events)
            .values(record)
            .execute(&mut self.conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(StoreError::Duplicate(record.event_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn prune(&mut self, cutoff: NaiveDateTime) -> Result<PruneCounts, StoreError> {
        use crate::schema::{logs, processed_events};

        // each DELETE is a single atomic statement
        let events = diesel::delete(
            processed_events::table.filter(processed_events::created_at.lt(cutoff)),
        )
        .execute(&mut self.conn)
        .await?;

        let log_rows = diesel::delete(logs::table.filter(logs::created_at.lt(cutoff)))
            .execute(&mut self.conn)
            .await?;

        Ok(PruneCounts {
            events,
            logs: log_rows,
        })
    }

    async fn append_log(&mut self, entry: &NewLogEntry) -> Result<(), StoreError> {
        use crate::schema::logs::dsl::*;

        diesel::insert_into(logs)
            .values(entry)
            .execute(&mut self.conn)
            .await?;

        Ok(())
    }
}
