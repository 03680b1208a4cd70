//! report_entries and their dimension tables (apps, breakage categories, OS).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use triage_core::Report;
use uuid::Uuid;

use crate::error::Result;
use crate::schema::{apps, breakage_categories, operating_systems, report_entries};

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = apps)]
pub struct App {
    pub id: i64,
    pub channel: Option<String>,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = apps)]
pub struct NewApp<'a> {
    pub channel: Option<&'a str>,
    pub name: &'a str,
    pub version: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = breakage_categories)]
pub struct BreakageCategory {
    pub id: i64,
    pub value: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = operating_systems)]
pub struct OperatingSystem {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = report_entries)]
pub struct ReportEntry {
    pub id: i64,
    pub app_id: i64,
    pub breakage_category_id: Option<i64>,
    pub bucket_id: Option<i64>,
    pub comments: String,
    pub comments_translated: Option<String>,
    pub comments_original_language: Option<String>,
    pub details: serde_json::Value,
    pub os_id: i64,
    pub reported_at: DateTime<Utc>,
    pub url: String,
    pub uuid: Uuid,
    pub ml_valid_probability: Option<f64>,
    pub create_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = report_entries)]
pub struct NewReportEntry {
    pub app_id: i64,
    pub breakage_category_id: Option<i64>,
    pub bucket_id: Option<i64>,
    pub comments: String,
    pub comments_translated: Option<String>,
    pub comments_original_language: Option<String>,
    pub details: serde_json::Value,
    pub os_id: i64,
    pub reported_at: DateTime<Utc>,
    pub url: String,
    pub uuid: Uuid,
    pub ml_valid_probability: Option<f64>,
}

impl NewReportEntry {
    pub fn from_report(
        report: &Report,
        app_id: i64,
        breakage_category_id: Option<i64>,
        os_id: i64,
        bucket_id: Option<i64>,
    ) -> Self {
        Self {
            app_id,
            breakage_category_id,
            bucket_id,
            comments: report.comments.clone(),
            comments_translated: report.comments_translated.clone(),
            comments_original_language: report.comments_original_language.clone(),
            details: report.details.clone(),
            os_id,
            reported_at: report.reported_at,
            url: report.url.to_string(),
            uuid: report.uuid,
            ml_valid_probability: report.ml_valid_probability,
        }
    }
}

impl ReportEntry {
    /// Rebuild the report from this row and its dimension rows.
    pub fn to_report(
        &self,
        app: &App,
        os: &OperatingSystem,
        breakage_category: Option<&BreakageCategory>,
    ) -> Result<Report> {
        Ok(Report {
            app_name: app.name.clone(),
            app_channel: app.channel.clone(),
            app_version: app.version.clone(),
            breakage_category: breakage_category.map(|c| c.value.clone()),
            comments: self.comments.clone(),
            comments_translated: self.comments_translated.clone(),
            comments_original_language: self.comments_original_language.clone(),
            details: self.details.clone(),
            os: os.name.clone(),
            reported_at: self.reported_at,
            url: Report::parse_url(&self.url)?,
            uuid: self.uuid,
            ml_valid_probability: self.ml_valid_probability,
        })
    }
}

/// An entry together with its parsed report, built once per load.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub id: i64,
    pub bucket_id: Option<i64>,
    pub report: Report,
}

impl StoredEntry {
    pub fn snapshot(&self) -> EntrySnapshot {
        let r = &self.report;
        EntrySnapshot {
            id: self.id,
            bucket_id: self.bucket_id,
            uuid: r.uuid,
            url: r.url.to_string(),
            comments: r.comments.clone(),
            comments_translated: r.comments_translated.clone(),
            app_name: r.app_name.clone(),
            app_channel: r.app_channel.clone(),
            app_version: r.app_version.clone(),
            breakage_category: r.breakage_category.clone(),
            os: r.os.clone(),
            reported_at: r.reported_at,
            ml_valid_probability: r.ml_valid_probability,
        }
    }
}

/// Flattened view of an entry for reassignment previews.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySnapshot {
    pub id: i64,
    pub bucket_id: Option<i64>,
    pub uuid: Uuid,
    pub url: String,
    pub comments: String,
    pub comments_translated: Option<String>,
    pub app_name: String,
    pub app_channel: Option<String>,
    pub app_version: String,
    pub breakage_category: Option<String>,
    pub os: String,
    pub reported_at: DateTime<Utc>,
    pub ml_valid_probability: Option<f64>,
}
