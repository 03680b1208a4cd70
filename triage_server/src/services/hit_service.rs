//! Hourly bucket hit counters.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::store::TriageStore;

/// Count one entry for `bucket_id` in the hour containing `at`.
pub async fn increment(store: &dyn TriageStore, bucket_id: i64, at: DateTime<Utc>) -> Result<()> {
    store.increment_hit(bucket_id, at).await
}

/// Release one entry from the hour containing `at`. Missing or zero
/// counters are left alone.
pub async fn decrement(store: &dyn TriageStore, bucket_id: i64, at: DateTime<Utc>) -> Result<()> {
    store.decrement_hit(bucket_id, at).await
}

/// Whether the counters add up to the number of bucketed entries.
pub async fn is_consistent(store: &dyn TriageStore) -> Result<bool> {
    let hits = store.total_hits().await?;
    let entries = store.count_bucketed_entries().await?;
    if hits != entries {
        tracing::warn!(hits, entries, "Bucket hit counters out of sync");
    }
    Ok(hits == entries)
}
