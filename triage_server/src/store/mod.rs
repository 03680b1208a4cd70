//! Storage backends for triage records.
//!
//! [`TriageStore`] is the persistence contract the services run against:
//! unique-constraint enforcement, indexed lookups, atomic counter updates and
//! transactional batch membership writes. [`PgStore`] is the production
//! backend; [`MemoryStore`] mirrors its semantics in process.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use triage_core::Report;

use crate::error::Result;
use crate::events::MembershipChange;
use crate::models::bucket::{Bucket, BucketChanges, NewBucket};
use crate::models::bug::{Bug, BugProvider, NewBug, NewBugProvider};
use crate::models::entry::StoredEntry;
use crate::models::hit::BucketHit;

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Ordering of reassignment candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrder {
    /// Most recently created first.
    NewestFirst,
    /// Ascending id.
    Ascending,
}

#[async_trait]
pub trait TriageStore: Send + Sync {
    // ── Buckets ──

    async fn create_bucket(&self, new_bucket: NewBucket) -> Result<Bucket>;

    async fn get_bucket(&self, bucket_id: i64) -> Result<Option<Bucket>>;

    async fn list_buckets(&self) -> Result<Vec<Bucket>>;

    /// Ids of buckets whose domain shortcut equals `domain`.
    async fn bucket_ids_for_domain(&self, domain: &str) -> Result<Vec<i64>>;

    async fn update_bucket(&self, bucket_id: i64, changes: BucketChanges) -> Result<Bucket>;

    /// Delete a bucket with its entries and hit counters.
    async fn delete_bucket(&self, bucket_id: i64) -> Result<bool>;

    /// Set `reassign_in_progress` if it is clear. Returns whether it was set.
    async fn try_begin_reassign(&self, bucket_id: i64) -> Result<bool>;

    async fn finish_reassign(&self, bucket_id: i64) -> Result<()>;

    // ── Entries ──

    /// Insert an entry, creating dimension rows as needed and counting the
    /// hit. A duplicate uuid fails with `DuplicateReport` and changes nothing.
    async fn insert_entry(&self, report: &Report, bucket_id: Option<i64>) -> Result<i64>;

    async fn get_entry(&self, entry_id: i64) -> Result<Option<StoredEntry>>;

    async fn load_entries(&self, entry_ids: &[i64]) -> Result<Vec<StoredEntry>>;

    /// Ids of entries that are unbucketed, in `bucket`, or in a bucket of
    /// strictly lower priority.
    async fn candidate_ids(
        &self,
        bucket: &Bucket,
        order: CandidateOrder,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<i64>>;

    /// The lowest-id entry assigned to a bucket.
    async fn first_entry_in_bucket(&self, bucket_id: i64) -> Result<Option<StoredEntry>>;

    /// Unbucketed entries, newest first.
    async fn unbucketed_entries(&self, limit: usize) -> Result<Vec<StoredEntry>>;

    /// Move entries to `target` in one transaction: read each entry's current
    /// bucket, adjust hit counters, then write the new bucket reference.
    async fn set_membership(
        &self,
        entry_ids: &[i64],
        target: Option<i64>,
    ) -> Result<Vec<MembershipChange>>;

    /// Delete an entry, releasing its hit. Returns the removed membership.
    async fn delete_entry(&self, entry_id: i64) -> Result<Option<MembershipChange>>;

    async fn count_bucketed_entries(&self) -> Result<i64>;

    // ── Hit counters ──

    async fn increment_hit(&self, bucket_id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Decrement unless missing or already zero.
    async fn decrement_hit(&self, bucket_id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn bucket_hits(&self, bucket_id: i64) -> Result<Vec<BucketHit>>;

    /// Sum of all hit counters.
    async fn total_hits(&self) -> Result<i64>;

    // ── Bugs ──

    async fn create_bug_provider(&self, provider: NewBugProvider) -> Result<BugProvider>;

    async fn create_bug(&self, bug: NewBug) -> Result<Bug>;

    async fn get_bug(&self, bug_id: i64) -> Result<Option<(Bug, BugProvider)>>;
}
