mod common;

use common::*;
use proptest::prelude::*;
use triage_server::services::hit_service;
use triage_server::store::{MemoryStore, TriageStore};

#[tokio::test]
async fn increments_share_the_hour() {
    let store = MemoryStore::new();
    let bucket = bucket(&store, &hostname_signature("example.com"), 0).await;

    hit_service::increment(&store, bucket.id, at(9, 1)).await.unwrap();
    hit_service::increment(&store, bucket.id, at(9, 59)).await.unwrap();
    hit_service::increment(&store, bucket.id, at(10, 0)).await.unwrap();

    let hits = store.bucket_hits(bucket.id).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].begin_at, at(9, 0));
    assert_eq!(hits[0].count, 2);
    assert_eq!(hits[1].count, 1);
}

#[tokio::test]
async fn decrement_never_goes_negative() {
    let store = MemoryStore::new();
    let bucket = bucket(&store, &hostname_signature("example.com"), 0).await;

    // Missing row: silent no-op.
    hit_service::decrement(&store, bucket.id, at(9, 0)).await.unwrap();
    assert!(store.bucket_hits(bucket.id).await.unwrap().is_empty());

    hit_service::increment(&store, bucket.id, at(9, 0)).await.unwrap();
    hit_service::decrement(&store, bucket.id, at(9, 30)).await.unwrap();
    hit_service::decrement(&store, bucket.id, at(9, 30)).await.unwrap();
    let hits = store.bucket_hits(bucket.id).await.unwrap();
    assert_eq!(hits[0].count, 0);
}

#[tokio::test]
async fn repeated_ids_move_an_entry_once() {
    let store = MemoryStore::new();
    let a = bucket(&store, &hostname_signature("a.example"), 0).await;
    let b = bucket(&store, &hostname_signature("b.example"), 0).await;
    let first = entry(&store, &report("https://a.example/", "x"), Some(a.id)).await;
    entry(&store, &report("https://a.example/", "y"), Some(a.id)).await;

    let changes = store
        .set_membership(&[first, first], Some(b.id))
        .await
        .unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].previous, Some(a.id));

    let count = |hits: Vec<triage_server::models::hit::BucketHit>| -> Vec<i32> {
        hits.iter().map(|h| h.count).collect()
    };
    assert_eq!(count(store.bucket_hits(a.id).await.unwrap()), vec![1]);
    assert_eq!(count(store.bucket_hits(b.id).await.unwrap()), vec![1]);
    assert_hits_consistent(&store).await;
}

#[derive(Debug, Clone)]
enum Op {
    Insert { bucket: usize, hour: u32 },
    Move { entry: usize, bucket: Option<usize> },
    Delete { entry: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 0..4u32).prop_map(|(bucket, hour)| Op::Insert { bucket, hour }),
        (0..8usize, proptest::option::of(0..3usize))
            .prop_map(|(entry, bucket)| Op::Move { entry, bucket }),
        (0..8usize).prop_map(|entry| Op::Delete { entry }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn hits_track_bucketed_entries(ops in proptest::collection::vec(op(), 1..30)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let store = MemoryStore::new();
            let mut buckets = Vec::new();
            for host in ["a.example", "b.example", "c.example"] {
                buckets.push(bucket(&store, &hostname_signature(host), 0).await.id);
            }
            let mut entries = Vec::new();

            for op in ops {
                match op {
                    Op::Insert { bucket, hour } => {
                        let r = report_at("https://a.example/", "x", at(hour, 15));
                        entries.push(entry(&store, &r, Some(buckets[bucket])).await);
                    }
                    Op::Move { entry, bucket } => {
                        if let Some(id) = entries.get(entry) {
                            let target = bucket.map(|b| buckets[b]);
                            store.set_membership(&[*id], target).await.unwrap();
                        }
                    }
                    Op::Delete { entry } => {
                        if let Some(id) = entries.get(entry) {
                            store.delete_entry(*id).await.unwrap();
                        }
                    }
                }
                assert_hits_consistent(&store).await;
            }
            for id in &buckets {
                for hit in store.bucket_hits(*id).await.unwrap() {
                    assert!(hit.count >= 0);
                }
            }
        });
    }
}
