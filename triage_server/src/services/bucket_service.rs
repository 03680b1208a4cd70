//! Bucket management: creation, signature and priority changes, deletion.

use triage_core::Signature;

use crate::error::{Result, TriageError};
use crate::models::bucket::{Bucket, BucketChanges, NewBucket};
use crate::services::lookup_service::DomainCache;
use crate::store::TriageStore;

/// Create a bucket. The signature is stored canonically and the domain
/// shortcut derived from it.
pub async fn create_bucket(
    store: &dyn TriageStore,
    cache: &DomainCache,
    description: &str,
    signature: &Signature,
    priority: i32,
    bug_id: Option<i64>,
) -> Result<Bucket> {
    let mut new_bucket = NewBucket::new(description, signature, priority)?;
    if let Some(bug_id) = bug_id {
        new_bucket = new_bucket.with_bug(bug_id);
    }
    let bucket = store.create_bucket(new_bucket).await?;

    // A second bucket for a cached domain makes the lookup ambiguous.
    if let Some(domain) = &bucket.domain {
        cache.invalidate_domain(domain);
    }
    tracing::info!(
        bucket_id = bucket.id,
        priority = bucket.priority,
        domain = ?bucket.domain,
        "Bucket created"
    );
    Ok(bucket)
}

pub async fn get_bucket(store: &dyn TriageStore, bucket_id: i64) -> Result<Bucket> {
    store
        .get_bucket(bucket_id)
        .await?
        .ok_or_else(|| TriageError::NotFound(format!("bucket {bucket_id}")))
}

/// Replace a bucket's signature. Entries are not moved; run a reassignment.
pub async fn update_signature(
    store: &dyn TriageStore,
    cache: &DomainCache,
    bucket_id: i64,
    signature: &Signature,
) -> Result<Bucket> {
    let before = get_bucket(store, bucket_id).await?;
    let after = store
        .update_bucket(bucket_id, BucketChanges::signature(signature))
        .await?;

    if before.domain != after.domain {
        for domain in [&before.domain, &after.domain].into_iter().flatten() {
            cache.invalidate_domain(domain);
        }
    }
    tracing::info!(bucket_id, domain = ?after.domain, "Bucket signature updated");
    Ok(after)
}

pub async fn set_priority(store: &dyn TriageStore, bucket_id: i64, priority: i32) -> Result<Bucket> {
    let bucket = store
        .update_bucket(bucket_id, BucketChanges::priority(priority)?)
        .await?;
    tracing::info!(bucket_id, priority, "Bucket priority updated");
    Ok(bucket)
}

/// Link a bucket to an external bug.
pub async fn link_bug(store: &dyn TriageStore, bucket_id: i64, bug_id: i64) -> Result<Bucket> {
    let changes = BucketChanges {
        bug_id: Some(Some(bug_id)),
        write_date: Some(chrono::Utc::now()),
        ..Default::default()
    };
    store.update_bucket(bucket_id, changes).await
}

/// Delete a bucket together with its entries and hit counters.
pub async fn delete_bucket(store: &dyn TriageStore, cache: &DomainCache, bucket_id: i64) -> Result<()> {
    if !store.delete_bucket(bucket_id).await? {
        return Err(TriageError::NotFound(format!("bucket {bucket_id}")));
    }
    cache.invalidate_bucket(bucket_id);
    tracing::info!(bucket_id, "Bucket deleted");
    Ok(())
}
