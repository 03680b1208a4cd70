//! Bucket lookup for incoming reports, keyed by hostname.

use moka::sync::Cache;
use triage_core::Report;

use crate::error::Result;
use crate::models::bucket::NewBucket;
use crate::store::TriageStore;

/// Bounded hostname → bucket id cache, owned by the caller.
///
/// Entries are only valid while the bucket keeps that domain; bucket
/// services invalidate on domain changes and deletions.
#[derive(Clone)]
pub struct DomainCache {
    cache: Cache<String, i64>,
}

impl DomainCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::new(capacity),
        }
    }

    pub fn get(&self, domain: &str) -> Option<i64> {
        self.cache.get(domain)
    }

    pub fn insert(&self, domain: &str, bucket_id: i64) {
        self.cache.insert(domain.to_string(), bucket_id);
    }

    pub fn invalidate_domain(&self, domain: &str) {
        self.cache.invalidate(domain);
    }

    /// Drop every domain pointing at `bucket_id`.
    pub fn invalidate_bucket(&self, bucket_id: i64) {
        let stale: Vec<String> = self
            .cache
            .iter()
            .filter(|(_, id)| *id == bucket_id)
            .map(|(domain, _)| domain.to_string())
            .collect();
        for domain in stale {
            self.cache.invalidate(&domain);
        }
    }
}

/// Find the bucket a new report belongs to by hostname.
///
/// One bucket for the hostname is cached and returned; none creates a
/// hostname bucket; several are ambiguous and left to reassignment.
pub async fn find_bucket_for_report(
    store: &dyn TriageStore,
    cache: &DomainCache,
    report: &Report,
) -> Result<Option<i64>> {
    let Some(host) = report.hostname() else {
        return Ok(None);
    };
    if let Some(bucket_id) = cache.get(host) {
        return Ok(Some(bucket_id));
    }

    let ids = store.bucket_ids_for_domain(host).await?;
    let bucket_id = match ids.as_slice() {
        [id] => *id,
        [] => {
            let Some(signature) = report.create_signature() else {
                return Ok(None);
            };
            let bucket = store
                .create_bucket(NewBucket::new(format!("domain is {host}"), &signature, 0)?)
                .await?;
            tracing::info!(bucket_id = bucket.id, domain = host, "Domain bucket created");
            bucket.id
        }
        _ => {
            tracing::debug!(domain = host, buckets = ids.len(), "Ambiguous domain, no bucket");
            return Ok(None);
        }
    };

    cache.insert(host, bucket_id);
    Ok(Some(bucket_id))
}
