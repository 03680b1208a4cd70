mod common;

use common::*;
use triage_core::Signature;
use triage_server::events::{TracingSink, TriageEvent};
use triage_server::services::lookup_service::{find_bucket_for_report, DomainCache};
use triage_server::services::{bucket_service, entry_service, hit_service};
use triage_server::store::{MemoryStore, TriageStore};
use triage_server::TriageError;

#[tokio::test]
async fn duplicate_uuid_is_rejected_without_side_effects() {
    let store = MemoryStore::new();
    let bucket = bucket(&store, &hostname_signature("example.com"), 0).await;
    let first = report("https://example.com/", "broken");

    let (entry_id, events) = entry_service::create_from_report(&store, &first, Some(bucket.id))
        .await
        .unwrap();
    assert_eq!(
        events,
        vec![
            TriageEvent::BucketHit {
                bucket_id: bucket.id,
                entry_id,
            },
            TriageEvent::TriageRequested { entry_id },
        ]
    );

    let mut second = report("https://example.com/other", "also broken");
    second.uuid = first.uuid;
    let err = entry_service::create_from_report(&store, &second, Some(bucket.id))
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::DuplicateReport(uuid) if uuid == first.uuid));

    assert_eq!(store.count_bucketed_entries().await.unwrap(), 1);
    assert_eq!(store.total_hits().await.unwrap(), 1);
    assert_eq!(store.get_entry(entry_id).await.unwrap().unwrap().report, first);
}

#[tokio::test]
async fn deleting_entry_releases_its_hit() {
    let store = MemoryStore::new();
    let bucket = bucket(&store, &hostname_signature("example.com"), 0).await;
    let entry_id = entry(&store, &report("https://example.com/", "x"), Some(bucket.id)).await;
    entry(&store, &report("https://example.com/", "y"), Some(bucket.id)).await;

    let change = entry_service::delete_entry(&store, entry_id).await.unwrap();
    assert_eq!(change.previous, Some(bucket.id));
    assert_hits_consistent(&store).await;
    assert_eq!(store.total_hits().await.unwrap(), 1);

    assert!(matches!(
        entry_service::delete_entry(&store, entry_id).await,
        Err(TriageError::NotFound(_))
    ));
}

#[tokio::test]
async fn revalidate_unbuckets_entries_that_stopped_matching() {
    let store = MemoryStore::new();
    let cache = DomainCache::new(16);
    let bucket = bucket(&store, &hostname_signature("example.com"), 0).await;
    let entry_id = entry(&store, &report("https://example.com/", "x"), Some(bucket.id)).await;

    assert!(entry_service::revalidate_entry(&store, entry_id).await.unwrap().is_empty());

    bucket_service::update_signature(&store, &cache, bucket.id, &hostname_signature("example.org"))
        .await
        .unwrap();
    let events = entry_service::revalidate_entry(&store, entry_id).await.unwrap();
    assert_eq!(events, vec![TriageEvent::TriageRequested { entry_id }]);
    assert_eq!(bucket_of(&store, entry_id).await, None);
    assert_hits_consistent(&store).await;
}

#[tokio::test]
async fn lookup_uses_single_domain_bucket_and_caches_it() {
    let store = MemoryStore::new();
    let cache = DomainCache::new(16);
    let bucket = bucket(&store, &hostname_signature("example.com"), 0).await;

    let found = find_bucket_for_report(&store, &cache, &report("https://example.com/x", "a"))
        .await
        .unwrap();
    assert_eq!(found, Some(bucket.id));
    assert_eq!(cache.get("example.com"), Some(bucket.id));
}

#[tokio::test]
async fn lookup_creates_bucket_for_unknown_domain() {
    let store = MemoryStore::new();
    let cache = DomainCache::new(16);
    let incoming = report("https://fresh.example/", "a");

    let bucket_id = find_bucket_for_report(&store, &cache, &incoming)
        .await
        .unwrap()
        .unwrap();
    let bucket = store.get_bucket(bucket_id).await.unwrap().unwrap();
    assert_eq!(bucket.description, "domain is fresh.example");
    assert_eq!(bucket.domain.as_deref(), Some("fresh.example"));
    assert!(bucket.signature().unwrap().matches(&incoming));

    let again = find_bucket_for_report(&store, &cache, &report("https://fresh.example/b", "b"))
        .await
        .unwrap();
    assert_eq!(again, Some(bucket_id));
    assert_eq!(store.list_buckets().await.unwrap().len(), 1);
}

#[tokio::test]
async fn lookup_leaves_ambiguous_domains_unbucketed() {
    let store = MemoryStore::new();
    let cache = DomainCache::new(16);
    let signature = hostname_signature("example.com");
    let first = bucket_service::create_bucket(&store, &cache, "a", &signature, 0, None)
        .await
        .unwrap();

    let incoming = report("https://example.com/", "a");
    assert_eq!(
        find_bucket_for_report(&store, &cache, &incoming).await.unwrap(),
        Some(first.id)
    );

    // A second bucket for the domain invalidates the cached choice.
    bucket_service::create_bucket(&store, &cache, "b", &signature, 1, None)
        .await
        .unwrap();
    assert_eq!(cache.get("example.com"), None);
    assert_eq!(find_bucket_for_report(&store, &cache, &incoming).await.unwrap(), None);
}

#[tokio::test]
async fn deleting_bucket_invalidates_cache_and_cascades() {
    let store = MemoryStore::new();
    let cache = DomainCache::new(16);
    let bucket = bucket_service::create_bucket(
        &store,
        &cache,
        "example",
        &hostname_signature("example.com"),
        0,
        None,
    )
    .await
    .unwrap();
    find_bucket_for_report(&store, &cache, &report("https://example.com/", "a"))
        .await
        .unwrap();
    entry(&store, &report("https://example.com/", "a"), Some(bucket.id)).await;

    bucket_service::delete_bucket(&store, &cache, bucket.id).await.unwrap();
    assert_eq!(cache.get("example.com"), None);
    assert_eq!(store.count_bucketed_entries().await.unwrap(), 0);
    assert_eq!(store.total_hits().await.unwrap(), 0);
    assert!(matches!(
        bucket_service::delete_bucket(&store, &cache, bucket.id).await,
        Err(TriageError::NotFound(_))
    ));
}

#[tokio::test]
async fn bucket_validation_happens_before_persistence() {
    let store = MemoryStore::new();
    let cache = DomainCache::new(16);
    let signature = Signature::parse(r#"{"symptoms":[{"type":"os","value":"Linux"}]}"#).unwrap();

    let err = bucket_service::create_bucket(&store, &cache, "x", &signature, 5, None)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(store.list_buckets().await.unwrap().is_empty());

    let bucket = bucket_service::create_bucket(&store, &cache, "x", &signature, 0, None)
        .await
        .unwrap();
    assert!(bucket_service::set_priority(&store, bucket.id, -3).await.is_err());
    let updated = bucket_service::set_priority(&store, bucket.id, -2).await.unwrap();
    assert_eq!(updated.priority, -2);
}

#[tokio::test]
async fn import_counts_created_duplicate_and_invalid_rows() {
    let store = MemoryStore::new();
    let cache = DomainCache::new(16);
    let input = r#"
{"uuid":"6f9619ff-8b86-d011-b42d-00c04fc964ff","app_name":"Firefox","app_version":"128.0","os":"Linux","reported_at":"2024-05-01T10:30:00Z","url":"https://example.com/","comments":"video broken"}
{"uuid":"6f9619ff-8b86-d011-b42d-00c04fc964ff","app_name":"Firefox","app_version":"128.0","os":"Linux","reported_at":"2024-05-01T10:31:00Z","url":"https://example.com/","comments":"video broken"}
{"uuid":"1b4e28ba-2fa1-11d2-883f-0016d3cca427","app_name":"Firefox","app_version":"128.0","os":"Linux","reported_at":"2024-05-01T10:32:00Z","url":"https://example.com/"}
{"uuid":"9a3e1c5e-3d2b-4c47-8a0f-3f6b7e2d1c00","app_name":"Firefox","app_version":"128.0","os":"Linux","reported_at":"soon","url":"https://example.com/","comments":"x"}
not json
"#;

    let summary = entry_service::import_reports(&store, &cache, &TracingSink, input)
        .await
        .unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.bucketed, 1);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.rejected, 2);
    assert!(hit_service::is_consistent(&store).await.unwrap());
}
