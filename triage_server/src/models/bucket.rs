//! bucket — a group of reports sharing a signature.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use triage_core::{Signature, SignatureError};

use crate::error::{Result, TriageError};
use crate::schema::buckets;

/// Higher priority buckets match first.
pub const PRIORITY_RANGE: RangeInclusive<i32> = -2..=2;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = buckets)]
pub struct Bucket {
    pub id: i64,
    pub bug_id: Option<i64>,
    pub description: String,
    /// Set only when the signature is a single exact hostname symptom.
    pub domain: Option<String>,
    /// Hidden from listings until this date.
    pub hide_until: Option<DateTime<Utc>>,
    pub priority: i32,
    /// Canonical signature JSON.
    pub signature: String,
    pub reassign_in_progress: bool,
    pub create_date: Option<DateTime<Utc>>,
    pub write_date: Option<DateTime<Utc>>,
}

impl Bucket {
    pub fn signature(&self) -> std::result::Result<Signature, SignatureError> {
        Signature::parse(&self.signature)
    }

    /// Whether both buckets are linked to the same external bug.
    pub fn shares_bug_with(&self, other: &Bucket) -> bool {
        matches!((self.bug_id, other.bug_id), (Some(a), Some(b)) if a == b)
    }
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = buckets)]
pub struct NewBucket {
    pub bug_id: Option<i64>,
    pub description: String,
    pub domain: Option<String>,
    pub hide_until: Option<DateTime<Utc>>,
    pub priority: i32,
    pub signature: String,
}

impl NewBucket {
    /// Validated bucket with canonical signature text and derived domain.
    pub fn new(description: impl Into<String>, signature: &Signature, priority: i32) -> Result<Self> {
        check_priority(priority)?;
        Ok(Self {
            bug_id: None,
            description: description.into(),
            domain: signature.hostname_domain().map(str::to_string),
            hide_until: None,
            priority,
            signature: signature.canonical(),
        })
    }

    pub fn with_bug(mut self, bug_id: i64) -> Self {
        self.bug_id = Some(bug_id);
        self
    }
}

/// Partial bucket update. Signature and domain always change together.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = buckets)]
pub struct BucketChanges {
    pub signature: Option<String>,
    pub domain: Option<Option<String>>,
    pub priority: Option<i32>,
    pub bug_id: Option<Option<i64>>,
    pub hide_until: Option<Option<DateTime<Utc>>>,
    pub write_date: Option<DateTime<Utc>>,
}

impl BucketChanges {
    pub fn signature(signature: &Signature) -> Self {
        Self {
            signature: Some(signature.canonical()),
            domain: Some(signature.hostname_domain().map(str::to_string)),
            write_date: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn priority(priority: i32) -> Result<Self> {
        check_priority(priority)?;
        Ok(Self {
            priority: Some(priority),
            write_date: Some(Utc::now()),
            ..Default::default()
        })
    }

    pub fn apply_to(&self, bucket: &mut Bucket) {
        if let Some(signature) = &self.signature {
            bucket.signature = signature.clone();
        }
        if let Some(domain) = &self.domain {
            bucket.domain = domain.clone();
        }
        if let Some(priority) = self.priority {
            bucket.priority = priority;
        }
        if let Some(bug_id) = self.bug_id {
            bucket.bug_id = bug_id;
        }
        if let Some(hide_until) = self.hide_until {
            bucket.hide_until = hide_until;
        }
        if self.write_date.is_some() {
            bucket.write_date = self.write_date;
        }
    }
}

fn check_priority(priority: i32) -> Result<()> {
    if PRIORITY_RANGE.contains(&priority) {
        Ok(())
    } else {
        Err(TriageError::InvalidPriority(priority))
    }
}
