//! Batch reassignment of report entries into and out of a bucket.
//!
//! Candidates are entries in the bucket itself, in strictly lower priority
//! buckets, or unbucketed. Previews walk them newest first and return entry
//! snapshots; commits walk them by ascending id and move entries in update
//! batches, each its own transaction. A committed batch's events go to the
//! sink before the next batch starts.

use std::time::Instant;

use serde::Serialize;

use crate::error::{Result, TriageError};
use crate::events::{EventSink, TriageEvent};
use crate::models::bucket::Bucket;
use crate::models::entry::EntrySnapshot;
use crate::store::{CandidateOrder, TriageStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSizes {
    /// Entries loaded and matched at once; also caps preview snapshots.
    pub matching: usize,
    /// Entries moved per transaction on commit.
    pub update: usize,
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            matching: 100,
            update: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassignOptions {
    /// Apply the changes; otherwise only preview them.
    pub submit: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ReassignOptions {
    pub fn preview() -> Self {
        Self::default()
    }

    pub fn commit() -> Self {
        Self {
            submit: true,
            ..Self::default()
        }
    }

    pub fn page(mut self, limit: usize, offset: Option<usize>) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    fn validate(&self) -> Result<()> {
        match (self.limit, self.offset) {
            (Some(0), _) => Err(TriageError::InvalidPagination("limit must be positive")),
            (None, Some(_)) => Err(TriageError::InvalidPagination("offset requires a limit")),
            _ => Ok(()),
        }
    }
}

/// An entry moved by a reassignment: ids on commit, snapshots on preview.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Moved {
    Id(i64),
    Entry(EntrySnapshot),
}

impl Moved {
    pub fn id(&self) -> i64 {
        match self {
            Moved::Id(id) => *id,
            Moved::Entry(snapshot) => snapshot.id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReassignOutcome {
    pub entered: Vec<Moved>,
    pub exited: Vec<Moved>,
    /// Exact counts; preview snapshot lists are capped.
    pub entered_count: usize,
    pub exited_count: usize,
    /// Offset of the next page, when candidates remain past this one.
    pub next_offset: Option<usize>,
}

/// Recompute which candidates belong in `bucket` for one page.
pub async fn reassign(
    store: &dyn TriageStore,
    sink: &dyn EventSink,
    bucket: &Bucket,
    options: ReassignOptions,
    sizes: BatchSizes,
) -> Result<ReassignOutcome> {
    options.validate()?;
    let started = Instant::now();
    let signature = bucket.signature()?;

    let order = if options.submit {
        CandidateOrder::Ascending
    } else {
        CandidateOrder::NewestFirst
    };
    let offset = options.offset.unwrap_or(0);

    // One extra id tells whether another page follows.
    let mut ids = store
        .candidate_ids(bucket, order, offset, options.limit.map(|l| l.saturating_add(1)))
        .await?;
    let mut outcome = ReassignOutcome::default();
    if let Some(limit) = options.limit {
        if ids.len() > limit {
            ids.truncate(limit);
            outcome.next_offset = Some(offset.saturating_add(limit));
        }
    }

    let match_batch = sizes.matching.max(1);
    let mut entering = Vec::new();
    let mut exiting = Vec::new();

    for chunk in ids.chunks(match_batch) {
        let mut entries = store.load_entries(chunk).await?;
        if order == CandidateOrder::NewestFirst {
            entries.reverse();
        }

        for entry in entries {
            let matched = signature.matches(&entry.report);
            let in_bucket = entry.bucket_id == Some(bucket.id);

            if matched && !in_bucket {
                outcome.entered_count += 1;
                if options.submit {
                    entering.push(entry.id);
                } else if outcome.entered.len() < match_batch {
                    outcome.entered.push(Moved::Entry(entry.snapshot()));
                }
            } else if !matched && in_bucket {
                outcome.exited_count += 1;
                if options.submit {
                    exiting.push(entry.id);
                } else if outcome.exited.len() < match_batch {
                    outcome.exited.push(Moved::Entry(entry.snapshot()));
                }
            }
        }
    }

    if options.submit {
        let update_batch = sizes.update.max(1);
        for batch in entering.chunks(update_batch) {
            let changes = store.set_membership(batch, Some(bucket.id)).await?;
            sink.dispatch_all(&TriageEvent::for_changes(&changes));
            tracing::debug!(bucket_id = bucket.id, entries = batch.len(), "Entered batch applied");
        }
        for batch in exiting.chunks(update_batch) {
            let changes = store.set_membership(batch, None).await?;
            sink.dispatch_all(&TriageEvent::for_changes(&changes));
            tracing::debug!(bucket_id = bucket.id, entries = batch.len(), "Exited batch applied");
        }

        crate::metrics::reassigned("enter", outcome.entered_count);
        crate::metrics::reassigned("exit", outcome.exited_count);
        outcome.entered = entering.into_iter().map(Moved::Id).collect();
        outcome.exited = exiting.into_iter().map(Moved::Id).collect();
    }

    crate::metrics::reassign_duration(started.elapsed().as_millis() as u64);
    tracing::info!(
        bucket_id = bucket.id,
        submit = options.submit,
        candidates = ids.len(),
        entered = outcome.entered_count,
        exited = outcome.exited_count,
        next_offset = ?outcome.next_offset,
        "Reassignment page finished"
    );

    Ok(outcome)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReassignSummary {
    pub pages: usize,
    pub entered_count: usize,
    pub exited_count: usize,
}

/// Reassign every candidate page by page while holding the bucket's
/// `reassign_in_progress` flag. The flag is cleared whether or not a page
/// fails.
pub async fn run_full_reassignment(
    store: &dyn TriageStore,
    sink: &dyn EventSink,
    bucket_id: i64,
    submit: bool,
    page_size: usize,
    sizes: BatchSizes,
) -> Result<ReassignSummary> {
    if !store.try_begin_reassign(bucket_id).await? {
        return Err(TriageError::ReassignInProgress(bucket_id));
    }

    let result = reassign_pages(store, sink, bucket_id, submit, page_size, sizes).await;

    if let Err(e) = store.finish_reassign(bucket_id).await {
        tracing::error!(bucket_id, error = %e, "Failed to clear reassign flag");
        if result.is_ok() {
            return Err(e);
        }
    }
    result
}

async fn reassign_pages(
    store: &dyn TriageStore,
    sink: &dyn EventSink,
    bucket_id: i64,
    submit: bool,
    page_size: usize,
    sizes: BatchSizes,
) -> Result<ReassignSummary> {
    let bucket = store
        .get_bucket(bucket_id)
        .await?
        .ok_or_else(|| TriageError::NotFound(format!("bucket {bucket_id}")))?;

    let mut summary = ReassignSummary::default();
    let mut offset = None;
    loop {
        let options = ReassignOptions {
            submit,
            limit: Some(page_size),
            offset,
        };
        let page = reassign(store, sink, &bucket, options, sizes).await?;
        summary.pages += 1;
        summary.entered_count += page.entered_count;
        summary.exited_count += page.exited_count;

        match page.next_offset {
            Some(next) => offset = Some(next),
            None => break,
        }
    }

    tracing::info!(
        bucket_id,
        submit,
        pages = summary.pages,
        entered = summary.entered_count,
        exited = summary.exited_count,
        "Full reassignment finished"
    );
    Ok(summary)
}
