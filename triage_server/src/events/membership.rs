//! Membership change records and the events derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry's bucket reference changing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChange {
    pub entry_id: i64,
    pub previous: Option<i64>,
    pub current: Option<i64>,
    pub reported_at: DateTime<Utc>,
}

impl MembershipChange {
    pub fn is_change(&self) -> bool {
        self.previous != self.current
    }
}

/// Events that follow from report entry changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TriageEvent {
    /// A bucket received an entry; watchers get notified.
    BucketHit { bucket_id: i64, entry_id: i64 },
    /// An entry was created or left its bucket and needs triage.
    TriageRequested { entry_id: i64 },
}

impl TriageEvent {
    pub fn for_change(change: &MembershipChange) -> Option<TriageEvent> {
        if !change.is_change() {
            return None;
        }
        Some(match change.current {
            Some(bucket_id) => TriageEvent::BucketHit {
                bucket_id,
                entry_id: change.entry_id,
            },
            None => TriageEvent::TriageRequested {
                entry_id: change.entry_id,
            },
        })
    }

    pub fn for_changes(changes: &[MembershipChange]) -> Vec<TriageEvent> {
        changes.iter().filter_map(Self::for_change).collect()
    }

    /// Events for a freshly created entry.
    pub fn for_created(entry_id: i64, bucket_id: Option<i64>) -> Vec<TriageEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(bucket_id) = bucket_id {
            events.push(TriageEvent::BucketHit { bucket_id, entry_id });
        }
        events.push(TriageEvent::TriageRequested { entry_id });
        events
    }
}

/// Receives triage events. Delivery and ordering are up to the implementation.
pub trait EventSink: Send + Sync {
    fn dispatch(&self, event: &TriageEvent);

    fn dispatch_all(&self, events: &[TriageEvent]) {
        for event in events {
            self.dispatch(event);
        }
    }
}

/// Logs events; used when no notification backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn dispatch(&self, event: &TriageEvent) {
        match event {
            TriageEvent::BucketHit { bucket_id, entry_id } => tracing::info!(
                bucket_id,
                entry_id,
                "The bucket received a new report entry"
            ),
            TriageEvent::TriageRequested { entry_id } => {
                tracing::debug!(entry_id, "Entry queued for triage")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(previous: Option<i64>, current: Option<i64>) -> MembershipChange {
        MembershipChange {
            entry_id: 7,
            previous,
            current,
            reported_at: Utc::now(),
        }
    }

    #[test]
    fn events_follow_the_new_bucket() {
        assert_eq!(
            TriageEvent::for_change(&change(None, Some(3))),
            Some(TriageEvent::BucketHit { bucket_id: 3, entry_id: 7 })
        );
        assert_eq!(
            TriageEvent::for_change(&change(Some(3), None)),
            Some(TriageEvent::TriageRequested { entry_id: 7 })
        );
        assert_eq!(TriageEvent::for_change(&change(Some(3), Some(3))), None);
    }

    #[test]
    fn created_entries_are_always_triaged() {
        assert_eq!(
            TriageEvent::for_created(1, Some(2)),
            vec![
                TriageEvent::BucketHit { bucket_id: 2, entry_id: 1 },
                TriageEvent::TriageRequested { entry_id: 1 },
            ]
        );
        assert_eq!(
            TriageEvent::for_created(1, None),
            vec![TriageEvent::TriageRequested { entry_id: 1 }]
        );
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(TriageEvent::BucketHit { bucket_id: 1, entry_id: 2 }).unwrap();
        assert_eq!(json["type"], "BucketHit");
    }
}
