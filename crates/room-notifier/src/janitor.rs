//! Retention sweep for processed events and audit logs.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::audit;
use crate::db::{DedupStore, PruneCounts};
use crate::error::StoreError;

/// Rows with `created_at` strictly before this instant are expired.
pub fn retention_cutoff(now: DateTime<Utc>, retention: chrono::Duration) -> NaiveDateTime {
    (now - retention).naive_utc()
}

/// Remove everything older than `retention` and log what was removed.
pub async fn prune_expired<S: DedupStore>(
    store: &mut S,
    now: DateTime<Utc>,
    retention: chrono::Duration,
) -> Result<PruneCounts, StoreError> {
    let cutoff = retention_cutoff(now, retention);

    match store.prune(cutoff).await {
        Ok(counts) => {
            if counts.total() > 0 {
                audit::info(
                    store,
                    format!(
                        "Removed {} expired event record(s) and {} log entr(ies) older than {}",
                        counts.events, counts.logs, cutoff
                    ),
                )
                .await;
            } else {
                tracing::debug!("Nothing older than {} to remove", cutoff);
            }
            Ok(counts)
        }
        Err(e) => {
            audit::error(store, format!("Failed to remove expired data: {}", e)).await;
            Err(e)
        }
    }
}
