//! bucket_hits — hourly per-bucket activity counters.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::bucket_hits;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = bucket_hits)]
pub struct BucketHit {
    pub id: i64,
    pub bucket_id: i64,
    pub begin_at: DateTime<Utc>,
    pub count: i32,
}

/// Truncate a timestamp to the start of its hour.
pub fn truncate_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::hours(1)).unwrap_or(at)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitAdjustment {
    Increment { bucket_id: i64, begin_at: DateTime<Utc> },
    Decrement { bucket_id: i64, begin_at: DateTime<Utc> },
}

/// Counter changes for an entry moving from `previous` to `next`.
/// Decrements come first; nothing changes when the bucket stays the same.
pub fn hit_adjustments(
    previous: Option<i64>,
    next: Option<i64>,
    reported_at: DateTime<Utc>,
) -> Vec<HitAdjustment> {
    if previous == next {
        return Vec::new();
    }
    let begin_at = truncate_to_hour(reported_at);
    let mut adjustments = Vec::with_capacity(2);
    if let Some(bucket_id) = previous {
        adjustments.push(HitAdjustment::Decrement { bucket_id, begin_at });
    }
    if let Some(bucket_id) = next {
        adjustments.push(HitAdjustment::Increment { bucket_id, begin_at });
    }
    adjustments
}
