//! In-process store with the same semantics as the PostgreSQL backend.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use triage_core::Report;
use uuid::Uuid;

use super::{CandidateOrder, TriageStore};
use crate::error::{Result, TriageError};
use crate::events::MembershipChange;
use crate::models::bucket::{Bucket, BucketChanges, NewBucket};
use crate::models::bug::{Bug, BugProvider, NewBug, NewBugProvider};
use crate::models::entry::StoredEntry;
use crate::models::hit::{hit_adjustments, truncate_to_hour, BucketHit, HitAdjustment};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    buckets: BTreeMap<i64, Bucket>,
    entries: BTreeMap<i64, StoredEntry>,
    uuids: HashSet<Uuid>,
    hits: BTreeMap<(i64, DateTime<Utc>), BucketHit>,
    providers: BTreeMap<i64, BugProvider>,
    bugs: BTreeMap<i64, Bug>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn apply(&mut self, adjustment: HitAdjustment) {
        match adjustment {
            HitAdjustment::Increment { bucket_id, begin_at } => {
                let id = self.next_id();
                let hit = self
                    .hits
                    .entry((bucket_id, begin_at))
                    .or_insert_with(|| BucketHit {
                        id,
                        bucket_id,
                        begin_at,
                        count: 0,
                    });
                hit.count += 1;
                crate::metrics::bucket_hit_changed("increment");
            }
            HitAdjustment::Decrement { bucket_id, begin_at } => {
                if let Some(hit) = self.hits.get_mut(&(bucket_id, begin_at)) {
                    if hit.count > 0 {
                        hit.count -= 1;
                        crate::metrics::bucket_hit_changed("decrement");
                    }
                }
            }
        }
    }

    fn bucket(&self, bucket_id: i64) -> Result<&Bucket> {
        self.buckets
            .get(&bucket_id)
            .ok_or_else(|| TriageError::NotFound(format!("bucket {bucket_id}")))
    }
}

/// Cloneable handle to shared in-memory triage state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TriageStore for MemoryStore {
    async fn create_bucket(&self, new_bucket: NewBucket) -> Result<Bucket> {
        let mut state = self.state.write().await;
        if let Some(bug_id) = new_bucket.bug_id {
            if !state.bugs.contains_key(&bug_id) {
                return Err(TriageError::NotFound(format!("bug {bug_id}")));
            }
        }
        let id = state.next_id();
        let now = Utc::now();
        let bucket = Bucket {
            id,
            bug_id: new_bucket.bug_id,
            description: new_bucket.description,
            domain: new_bucket.domain,
            hide_until: new_bucket.hide_until,
            priority: new_bucket.priority,
            signature: new_bucket.signature,
            reassign_in_progress: false,
            create_date: Some(now),
            write_date: Some(now),
        };
        state.buckets.insert(id, bucket.clone());
        Ok(bucket)
    }

    async fn get_bucket(&self, bucket_id: i64) -> Result<Option<Bucket>> {
        Ok(self.state.read().await.buckets.get(&bucket_id).cloned())
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        Ok(self.state.read().await.buckets.values().cloned().collect())
    }

    async fn bucket_ids_for_domain(&self, domain: &str) -> Result<Vec<i64>> {
        let state = self.state.read().await;
        Ok(state
            .buckets
            .values()
            .filter(|b| b.domain.as_deref() == Some(domain))
            .map(|b| b.id)
            .collect())
    }

    async fn update_bucket(&self, bucket_id: i64, changes: BucketChanges) -> Result<Bucket> {
        let mut state = self.state.write().await;
        if let Some(Some(bug_id)) = changes.bug_id {
            if !state.bugs.contains_key(&bug_id) {
                return Err(TriageError::NotFound(format!("bug {bug_id}")));
            }
        }
        let bucket = state
            .buckets
            .get_mut(&bucket_id)
            .ok_or_else(|| TriageError::NotFound(format!("bucket {bucket_id}")))?;
        changes.apply_to(bucket);
        Ok(bucket.clone())
    }

    async fn delete_bucket(&self, bucket_id: i64) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.buckets.remove(&bucket_id).is_none() {
            return Ok(false);
        }
        let doomed: Vec<i64> = state
            .entries
            .values()
            .filter(|e| e.bucket_id == Some(bucket_id))
            .map(|e| e.id)
            .collect();
        for id in doomed {
            if let Some(entry) = state.entries.remove(&id) {
                state.uuids.remove(&entry.report.uuid);
            }
        }
        state.hits.retain(|(b, _), _| *b != bucket_id);
        Ok(true)
    }

    async fn try_begin_reassign(&self, bucket_id: i64) -> Result<bool> {
        let mut state = self.state.write().await;
        let bucket = state
            .buckets
            .get_mut(&bucket_id)
            .ok_or_else(|| TriageError::NotFound(format!("bucket {bucket_id}")))?;
        if bucket.reassign_in_progress {
            return Ok(false);
        }
        bucket.reassign_in_progress = true;
        Ok(true)
    }

    async fn finish_reassign(&self, bucket_id: i64) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(bucket) = state.buckets.get_mut(&bucket_id) {
            bucket.reassign_in_progress = false;
        }
        Ok(())
    }

    async fn insert_entry(&self, report: &Report, bucket_id: Option<i64>) -> Result<i64> {
        let mut state = self.state.write().await;
        if state.uuids.contains(&report.uuid) {
            return Err(TriageError::DuplicateReport(report.uuid));
        }
        if let Some(bucket_id) = bucket_id {
            state.bucket(bucket_id)?;
        }
        let id = state.next_id();
        for adjustment in hit_adjustments(None, bucket_id, report.reported_at) {
            state.apply(adjustment);
        }
        state.uuids.insert(report.uuid);
        state.entries.insert(
            id,
            StoredEntry {
                id,
                bucket_id,
                report: report.clone(),
            },
        );
        Ok(id)
    }

    async fn get_entry(&self, entry_id: i64) -> Result<Option<StoredEntry>> {
        Ok(self.state.read().await.entries.get(&entry_id).cloned())
    }

    async fn load_entries(&self, entry_ids: &[i64]) -> Result<Vec<StoredEntry>> {
        let state = self.state.read().await;
        let wanted: HashSet<i64> = entry_ids.iter().copied().collect();
        Ok(state
            .entries
            .values()
            .filter(|e| wanted.contains(&e.id))
            .cloned()
            .collect())
    }

    async fn candidate_ids(
        &self,
        bucket: &Bucket,
        order: CandidateOrder,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<i64>> {
        if i64::try_from(offset).is_err() {
            return Err(TriageError::InvalidPagination("offset out of range"));
        }
        let state = self.state.read().await;
        let eligible = |entry: &&StoredEntry| match entry.bucket_id {
            None => true,
            Some(id) if id == bucket.id => true,
            Some(id) => state
                .buckets
                .get(&id)
                .is_some_and(|other| other.priority < bucket.priority),
        };
        let ids: Box<dyn Iterator<Item = i64> + '_> = match order {
            CandidateOrder::Ascending => {
                Box::new(state.entries.values().filter(eligible).map(|e| e.id))
            }
            CandidateOrder::NewestFirst => {
                Box::new(state.entries.values().rev().filter(eligible).map(|e| e.id))
            }
        };
        let ids = ids.skip(offset);
        Ok(match limit {
            Some(limit) => ids.take(limit).collect(),
            None => ids.collect(),
        })
    }

    async fn first_entry_in_bucket(&self, bucket_id: i64) -> Result<Option<StoredEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .values()
            .find(|e| e.bucket_id == Some(bucket_id))
            .cloned())
    }

    async fn unbucketed_entries(&self, limit: usize) -> Result<Vec<StoredEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .values()
            .rev()
            .filter(|e| e.bucket_id.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_membership(
        &self,
        entry_ids: &[i64],
        target: Option<i64>,
    ) -> Result<Vec<MembershipChange>> {
        let mut state = self.state.write().await;
        if let Some(target) = target {
            state.bucket(target)?;
        }
        let mut changes = Vec::with_capacity(entry_ids.len());
        // Rows are locked once each, as `eq_any` does on PostgreSQL.
        let unique: BTreeSet<i64> = entry_ids.iter().copied().collect();
        for id in unique {
            let Some(entry) = state.entries.get_mut(&id) else {
                continue;
            };
            let change = MembershipChange {
                entry_id: id,
                previous: entry.bucket_id,
                current: target,
                reported_at: entry.report.reported_at,
            };
            entry.bucket_id = target;
            for adjustment in hit_adjustments(change.previous, target, change.reported_at) {
                state.apply(adjustment);
            }
            changes.push(change);
        }
        Ok(changes)
    }

    async fn delete_entry(&self, entry_id: i64) -> Result<Option<MembershipChange>> {
        let mut state = self.state.write().await;
        let Some(entry) = state.entries.remove(&entry_id) else {
            return Ok(None);
        };
        state.uuids.remove(&entry.report.uuid);
        let change = MembershipChange {
            entry_id,
            previous: entry.bucket_id,
            current: None,
            reported_at: entry.report.reported_at,
        };
        for adjustment in hit_adjustments(change.previous, None, change.reported_at) {
            state.apply(adjustment);
        }
        Ok(Some(change))
    }

    async fn count_bucketed_entries(&self) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state.entries.values().filter(|e| e.bucket_id.is_some()).count() as i64)
    }

    async fn increment_hit(&self, bucket_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        state.bucket(bucket_id)?;
        state.apply(HitAdjustment::Increment {
            bucket_id,
            begin_at: truncate_to_hour(at),
        });
        Ok(())
    }

    async fn decrement_hit(&self, bucket_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.state.write().await.apply(HitAdjustment::Decrement {
            bucket_id,
            begin_at: truncate_to_hour(at),
        });
        Ok(())
    }

    async fn bucket_hits(&self, bucket_id: i64) -> Result<Vec<BucketHit>> {
        let state = self.state.read().await;
        Ok(state
            .hits
            .values()
            .filter(|h| h.bucket_id == bucket_id)
            .cloned()
            .collect())
    }

    async fn total_hits(&self) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state.hits.values().map(|h| i64::from(h.count)).sum())
    }

    async fn create_bug_provider(&self, provider: NewBugProvider) -> Result<BugProvider> {
        let mut state = self.state.write().await;
        let id = state.next_id();
        let provider = BugProvider {
            id,
            classname: provider.classname,
            hostname: provider.hostname,
            url_template: provider.url_template,
        };
        state.providers.insert(id, provider.clone());
        Ok(provider)
    }

    async fn create_bug(&self, bug: NewBug) -> Result<Bug> {
        let mut state = self.state.write().await;
        if !state.providers.contains_key(&bug.provider_id) {
            return Err(TriageError::NotFound(format!(
                "bug provider {}",
                bug.provider_id
            )));
        }
        let id = state.next_id();
        let bug = Bug {
            id,
            external_id: bug.external_id,
            provider_id: bug.provider_id,
            closed: None,
        };
        state.bugs.insert(id, bug.clone());
        Ok(bug)
    }

    async fn get_bug(&self, bug_id: i64) -> Result<Option<(Bug, BugProvider)>> {
        let state = self.state.read().await;
        Ok(state.bugs.get(&bug_id).and_then(|bug| {
            state
                .providers
                .get(&bug.provider_id)
                .map(|p| (bug.clone(), p.clone()))
        }))
    }
}
