//! Greedy signature generalization over unbucketed entries.

use std::collections::HashMap;

use serde::Serialize;
use triage_core::Signature;

use crate::error::Result;
use crate::models::bucket::Bucket;
use crate::models::entry::{EntrySnapshot, StoredEntry};
use crate::store::TriageStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizedSignature {
    pub signature: Signature,
    /// Unbucketed entries the generalized signature matches.
    pub matching_entries: Vec<EntrySnapshot>,
}

/// Find a generalization of `bucket`'s signature that absorbs one of
/// `entries` without matching another bucket's first entry.
///
/// Entries are tried in the given order and the first acceptable candidate
/// wins. Buckets linked to the same bug as `bucket` may overlap.
pub async fn optimize_signature(
    store: &dyn TriageStore,
    bucket: &Bucket,
    entries: &[StoredEntry],
) -> Result<Option<OptimizedSignature>> {
    let signature = bucket.signature()?;
    let others: Vec<Bucket> = store
        .list_buckets()
        .await?
        .into_iter()
        .filter(|other| other.id != bucket.id && !other.shares_bug_with(bucket))
        .collect();
    let mut first_entries: HashMap<i64, Option<StoredEntry>> = HashMap::new();

    for entry in entries {
        // Direct matches need no broadening.
        if signature.matches(&entry.report) {
            continue;
        }
        let Some(candidate) = signature.fit(&entry.report) else {
            continue;
        };

        if let Some(other_id) =
            overlapping_bucket(store, &others, &mut first_entries, &candidate).await?
        {
            tracing::debug!(
                bucket_id = bucket.id,
                entry_id = entry.id,
                other_bucket_id = other_id,
                "Generalized signature overlaps another bucket"
            );
            crate::metrics::optimization("overlap");
            continue;
        }

        let matching_entries: Vec<EntrySnapshot> = entries
            .iter()
            .filter(|e| candidate.matches(&e.report))
            .map(StoredEntry::snapshot)
            .collect();
        if matching_entries.is_empty() {
            crate::metrics::optimization("no_benefit");
            continue;
        }

        crate::metrics::optimization("accepted");
        tracing::info!(
            bucket_id = bucket.id,
            entry_id = entry.id,
            matching = matching_entries.len(),
            "Signature optimization found"
        );
        return Ok(Some(OptimizedSignature {
            signature: candidate,
            matching_entries,
        }));
    }

    crate::metrics::optimization("none");
    tracing::info!(bucket_id = bucket.id, tried = entries.len(), "No signature optimization");
    Ok(None)
}

/// The first other bucket whose first entry `candidate` matches.
async fn overlapping_bucket(
    store: &dyn TriageStore,
    others: &[Bucket],
    first_entries: &mut HashMap<i64, Option<StoredEntry>>,
    candidate: &Signature,
) -> Result<Option<i64>> {
    for other in others {
        if !first_entries.contains_key(&other.id) {
            let first = store.first_entry_in_bucket(other.id).await?;
            first_entries.insert(other.id, first);
        }
        let matched = first_entries
            .get(&other.id)
            .and_then(Option::as_ref)
            .is_some_and(|first| candidate.matches(&first.report));
        if matched {
            return Ok(Some(other.id));
        }
    }
    Ok(None)
}
