//! bugs and bug_providers — external bug linkage for buckets.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{bug_providers, bugs};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = bug_providers)]
pub struct BugProvider {
    pub id: i64,
    /// Registry key of the tracker implementation, e.g. "BugzillaProvider".
    pub classname: String,
    pub hostname: String,
    /// Link template, `%s` is replaced by the external bug id.
    pub url_template: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bug_providers)]
pub struct NewBugProvider {
    pub classname: String,
    pub hostname: String,
    pub url_template: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = bugs)]
pub struct Bug {
    pub id: i64,
    pub external_id: String,
    pub provider_id: i64,
    pub closed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bugs)]
pub struct NewBug {
    pub external_id: String,
    pub provider_id: i64,
}
