//! Report entry lifecycle: creation, import, deletion and revalidation.

use serde::Serialize;
use triage_core::{RawReport, Report};

use crate::error::{Result, TriageError};
use crate::events::{EventSink, MembershipChange, TriageEvent};
use crate::services::lookup_service::{self, DomainCache};
use crate::store::TriageStore;

/// Persist a report as a new entry, counting its hit when bucketed.
///
/// A uuid that already exists fails with [`TriageError::DuplicateReport`]
/// and leaves storage untouched.
pub async fn create_from_report(
    store: &dyn TriageStore,
    report: &Report,
    bucket_id: Option<i64>,
) -> Result<(i64, Vec<TriageEvent>)> {
    let entry_id = store.insert_entry(report, bucket_id).await?;

    crate::metrics::report_imported(bucket_id.is_some());
    tracing::info!(
        entry_id,
        bucket_id,
        uuid = %report.uuid,
        "Report entry created"
    );

    Ok((entry_id, TriageEvent::for_created(entry_id, bucket_id)))
}

/// Delete an entry and release its bucket hit.
pub async fn delete_entry(store: &dyn TriageStore, entry_id: i64) -> Result<MembershipChange> {
    let change = store
        .delete_entry(entry_id)
        .await?
        .ok_or_else(|| TriageError::NotFound(format!("entry {entry_id}")))?;
    tracing::info!(entry_id, bucket_id = change.previous, "Report entry deleted");
    Ok(change)
}

/// Re-check an entry against its bucket's signature and unbucket it when it
/// no longer matches.
pub async fn revalidate_entry(store: &dyn TriageStore, entry_id: i64) -> Result<Vec<TriageEvent>> {
    let entry = store
        .get_entry(entry_id)
        .await?
        .ok_or_else(|| TriageError::NotFound(format!("entry {entry_id}")))?;
    let Some(bucket_id) = entry.bucket_id else {
        return Ok(Vec::new());
    };
    let bucket = store
        .get_bucket(bucket_id)
        .await?
        .ok_or_else(|| TriageError::NotFound(format!("bucket {bucket_id}")))?;

    if bucket.signature()?.matches(&entry.report) {
        return Ok(Vec::new());
    }

    let changes = store.set_membership(&[entry_id], None).await?;
    tracing::info!(entry_id, bucket_id, "Entry no longer matches its bucket");
    Ok(TriageEvent::for_changes(&changes))
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Entries created.
    pub created: usize,
    /// Created entries that found a bucket.
    pub bucketed: usize,
    /// Rows whose uuid was already stored.
    pub duplicates: usize,
    /// Rows without a URL or comments.
    pub skipped: usize,
    /// Rows that failed to parse or validate.
    pub rejected: usize,
}

/// Import newline-delimited JSON report rows.
///
/// Each row is looked up against the domain buckets and stored on its own;
/// invalid rows and duplicates are counted and skipped, storage failures
/// abort the import.
pub async fn import_reports(
    store: &dyn TriageStore,
    cache: &DomainCache,
    sink: &dyn EventSink,
    input: &str,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = index + 1;

        let raw: RawReport = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Malformed report row");
                summary.rejected += 1;
                continue;
            }
        };
        let report = match raw.into_report() {
            Ok(Some(report)) => report,
            Ok(None) => {
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Invalid report row");
                summary.rejected += 1;
                continue;
            }
        };

        let bucket_id = lookup_service::find_bucket_for_report(store, cache, &report).await?;
        match create_from_report(store, &report, bucket_id).await {
            Ok((_, events)) => {
                summary.created += 1;
                if bucket_id.is_some() {
                    summary.bucketed += 1;
                }
                sink.dispatch_all(&events);
            }
            Err(TriageError::DuplicateReport(uuid)) => {
                tracing::debug!(%uuid, "Report already imported");
                summary.duplicates += 1;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        created = summary.created,
        duplicates = summary.duplicates,
        skipped = summary.skipped,
        rejected = summary.rejected,
        "Import finished"
    );
    Ok(summary)
}
