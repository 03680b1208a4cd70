#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use triage_core::{Report, Signature};
use triage_server::events::{EventSink, MembershipChange, TriageEvent};
use triage_server::models::bucket::{Bucket, BucketChanges, NewBucket};
use triage_server::models::bug::{Bug, BugProvider, NewBug, NewBugProvider};
use triage_server::models::entry::StoredEntry;
use triage_server::models::hit::BucketHit;
use triage_server::store::{CandidateOrder, MemoryStore, TriageStore};
use triage_server::{Result, TriageError};
use uuid::Uuid;

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
}

pub fn report(url: &str, comments: &str) -> Report {
    report_at(url, comments, at(10, 30))
}

pub fn report_at(url: &str, comments: &str, reported_at: DateTime<Utc>) -> Report {
    Report {
        app_name: "Firefox".into(),
        app_channel: Some("release".into()),
        app_version: "128.0".into(),
        breakage_category: Some("media".into()),
        comments: comments.into(),
        comments_translated: None,
        comments_original_language: None,
        details: json!({}),
        os: "Linux".into(),
        reported_at,
        url: Report::parse_url(url).unwrap(),
        uuid: Uuid::new_v4(),
        ml_valid_probability: None,
    }
}

pub fn hostname_signature(host: &str) -> Signature {
    Signature::parse(&format!(
        r#"{{"symptoms":[{{"type":"url","part":"hostname","value":"{host}"}}]}}"#
    ))
    .unwrap()
}

pub async fn bucket(store: &MemoryStore, signature: &Signature, priority: i32) -> Bucket {
    store
        .create_bucket(NewBucket::new("test bucket", signature, priority).unwrap())
        .await
        .unwrap()
}

pub async fn entry(store: &MemoryStore, report: &Report, bucket_id: Option<i64>) -> i64 {
    store.insert_entry(report, bucket_id).await.unwrap()
}

pub async fn bucket_of(store: &MemoryStore, entry_id: i64) -> Option<i64> {
    store.get_entry(entry_id).await.unwrap().unwrap().bucket_id
}

/// Hit counters sum up to the number of bucketed entries.
pub async fn assert_hits_consistent(store: &MemoryStore) {
    assert_eq!(
        store.total_hits().await.unwrap(),
        store.count_bucketed_entries().await.unwrap()
    );
}

/// Keeps every dispatched event, in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TriageEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TriageEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn dispatch(&self, event: &TriageEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// A [`MemoryStore`] whose membership writes fail once `allowed` of them
/// have gone through.
pub struct FailingStore {
    pub inner: MemoryStore,
    allowed: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: MemoryStore, allowed: usize) -> Self {
        Self {
            inner,
            allowed: AtomicUsize::new(allowed),
        }
    }
}

#[async_trait]
impl TriageStore for FailingStore {
    async fn create_bucket(&self, new_bucket: NewBucket) -> Result<Bucket> {
        self.inner.create_bucket(new_bucket).await
    }

    async fn get_bucket(&self, bucket_id: i64) -> Result<Option<Bucket>> {
        self.inner.get_bucket(bucket_id).await
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        self.inner.list_buckets().await
    }

    async fn bucket_ids_for_domain(&self, domain: &str) -> Result<Vec<i64>> {
        self.inner.bucket_ids_for_domain(domain).await
    }

    async fn update_bucket(&self, bucket_id: i64, changes: BucketChanges) -> Result<Bucket> {
        self.inner.update_bucket(bucket_id, changes).await
    }

    async fn delete_bucket(&self, bucket_id: i64) -> Result<bool> {
        self.inner.delete_bucket(bucket_id).await
    }

    async fn try_begin_reassign(&self, bucket_id: i64) -> Result<bool> {
        self.inner.try_begin_reassign(bucket_id).await
    }

    async fn finish_reassign(&self, bucket_id: i64) -> Result<()> {
        self.inner.finish_reassign(bucket_id).await
    }

    async fn insert_entry(&self, report: &Report, bucket_id: Option<i64>) -> Result<i64> {
        self.inner.insert_entry(report, bucket_id).await
    }

    async fn get_entry(&self, entry_id: i64) -> Result<Option<StoredEntry>> {
        self.inner.get_entry(entry_id).await
    }

    async fn load_entries(&self, entry_ids: &[i64]) -> Result<Vec<StoredEntry>> {
        self.inner.load_entries(entry_ids).await
    }

    async fn candidate_ids(
        &self,
        bucket: &Bucket,
        order: CandidateOrder,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<i64>> {
        self.inner.candidate_ids(bucket, order, offset, limit).await
    }

    async fn first_entry_in_bucket(&self, bucket_id: i64) -> Result<Option<StoredEntry>> {
        self.inner.first_entry_in_bucket(bucket_id).await
    }

    async fn unbucketed_entries(&self, limit: usize) -> Result<Vec<StoredEntry>> {
        self.inner.unbucketed_entries(limit).await
    }

    async fn set_membership(
        &self,
        entry_ids: &[i64],
        target: Option<i64>,
    ) -> Result<Vec<MembershipChange>> {
        let left = self
            .allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if left.is_err() {
            return Err(TriageError::Pool("connection lost".into()));
        }
        self.inner.set_membership(entry_ids, target).await
    }

    async fn delete_entry(&self, entry_id: i64) -> Result<Option<MembershipChange>> {
        self.inner.delete_entry(entry_id).await
    }

    async fn count_bucketed_entries(&self) -> Result<i64> {
        self.inner.count_bucketed_entries().await
    }

    async fn increment_hit(&self, bucket_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.inner.increment_hit(bucket_id, at).await
    }

    async fn decrement_hit(&self, bucket_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.inner.decrement_hit(bucket_id, at).await
    }

    async fn bucket_hits(&self, bucket_id: i64) -> Result<Vec<BucketHit>> {
        self.inner.bucket_hits(bucket_id).await
    }

    async fn total_hits(&self) -> Result<i64> {
        self.inner.total_hits().await
    }

    async fn create_bug_provider(&self, provider: NewBugProvider) -> Result<BugProvider> {
        self.inner.create_bug_provider(provider).await
    }

    async fn create_bug(&self, bug: NewBug) -> Result<Bug> {
        self.inner.create_bug(bug).await
    }

    async fn get_bug(&self, bug_id: i64) -> Result<Option<(Bug, BugProvider)>> {
        self.inner.get_bug(bug_id).await
    }
}
