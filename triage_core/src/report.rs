//! Parsed web-compat reports.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::error::ReportError;
use crate::matcher::Matcher;
use crate::signature::Signature;
use crate::symptom::{Symptom, UrlPart};

/// A fully parsed, immutable submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub app_name: String,
    pub app_channel: Option<String>,
    pub app_version: String,
    pub breakage_category: Option<String>,
    pub comments: String,
    pub comments_translated: Option<String>,
    pub comments_original_language: Option<String>,
    pub details: Value,
    pub os: String,
    pub reported_at: DateTime<Utc>,
    pub url: Url,
    pub uuid: Uuid,
    pub ml_valid_probability: Option<f64>,
}

impl Report {
    pub fn hostname(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// Single-symptom signature matching this report's hostname exactly.
    pub fn create_signature(&self) -> Option<Signature> {
        let host = self.hostname()?;
        Some(Signature::from_symptom(Symptom::Url {
            part: UrlPart::Hostname,
            matcher: Matcher::exact(host),
        }))
    }

    pub fn parse_url(raw: &str) -> Result<Url, ReportError> {
        Url::parse(raw).map_err(|source| ReportError::Url {
            url: raw.to_string(),
            source,
        })
    }
}

/// A report row as delivered by the warehouse export, one JSON object per line.
#[derive(Debug, Clone, Deserialize)]
pub struct RawReport {
    pub uuid: Uuid,
    pub app_name: String,
    #[serde(default)]
    pub app_channel: Option<String>,
    pub app_version: String,
    #[serde(default)]
    pub breakage_category: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub translated_text: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub details: Value,
    pub os: String,
    pub reported_at: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ml_label: Option<String>,
    #[serde(default)]
    pub ml_probability: Option<f64>,
}

impl RawReport {
    /// Convert into a [`Report`]. Rows without a URL or comments are not
    /// reports worth triaging and yield `Ok(None)`.
    pub fn into_report(self) -> Result<Option<Report>, ReportError> {
        let (Some(url), Some(comments)) = (self.url, self.comments) else {
            return Ok(None);
        };

        if let Some(p) = self.ml_probability {
            if !(0.0..=1.0).contains(&p) {
                return Err(ReportError::Probability(p));
            }
        }
        // The classifier labels either "valid" or "invalid"; fold both into
        // a single probability of being valid.
        let ml_valid_probability = match self.ml_label.as_deref() {
            Some("valid") => self.ml_probability,
            Some("invalid") => self.ml_probability.map(|p| 1.0 - p),
            _ => None,
        };

        let details = match self.details {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        Ok(Some(Report {
            app_name: self.app_name,
            app_channel: self.app_channel,
            app_version: self.app_version,
            breakage_category: self.breakage_category,
            comments,
            comments_translated: self.translated_text,
            comments_original_language: self.language_code,
            details,
            os: self.os,
            reported_at: parse_timestamp(&self.reported_at)?,
            url: Report::parse_url(&url)?,
            uuid: self.uuid,
            ml_valid_probability,
        }))
    }
}

/// RFC 3339, or a naive timestamp interpreted as UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ReportError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ReportError::Timestamp(raw.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    pub(crate) fn sample_report(url: &str, comments: &str) -> Report {
        Report {
            app_name: "Firefox".into(),
            app_channel: Some("release".into()),
            app_version: "128.0".into(),
            breakage_category: Some("media".into()),
            comments: comments.into(),
            comments_translated: None,
            comments_original_language: None,
            details: json!({}),
            os: "Linux".into(),
            reported_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap(),
            url: Url::parse(url).unwrap(),
            uuid: Uuid::new_v4(),
            ml_valid_probability: None,
        }
    }

    fn raw(extra: Value) -> RawReport {
        let mut base = json!({
            "uuid": "6f9619ff-8b86-d011-b42d-00c04fc964ff",
            "app_name": "Firefox",
            "app_version": "128.0",
            "os": "Windows",
            "reported_at": "2024-05-01T10:30:00",
            "url": "https://example.com/page",
            "comments": "page is blank",
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn invalid_label_flips_probability() {
        let report = raw(json!({"ml_label": "invalid", "ml_probability": 0.95}))
            .into_report()
            .unwrap()
            .unwrap();
        let p = report.ml_valid_probability.unwrap();
        assert!((p - 0.05).abs() < 1e-9);

        let report = raw(json!({"ml_label": "valid", "ml_probability": 0.7}))
            .into_report()
            .unwrap()
            .unwrap();
        assert_eq!(report.ml_valid_probability, Some(0.7));

        let report = raw(json!({"ml_probability": 0.7}))
            .into_report()
            .unwrap()
            .unwrap();
        assert_eq!(report.ml_valid_probability, None);
    }

    #[test]
    fn naive_timestamps_are_utc_and_details_default_to_object() {
        let report = raw(json!({})).into_report().unwrap().unwrap();
        assert_eq!(
            report.reported_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap()
        );
        assert_eq!(report.details, json!({}));
        assert_eq!(report.hostname(), Some("example.com"));
    }

    #[test]
    fn rows_without_url_or_comments_are_skipped() {
        assert!(raw(json!({"url": null})).into_report().unwrap().is_none());
        assert!(raw(json!({"comments": null})).into_report().unwrap().is_none());
    }

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(matches!(
            raw(json!({"url": "not a url"})).into_report(),
            Err(ReportError::Url { .. })
        ));
        assert!(matches!(
            raw(json!({"ml_label": "valid", "ml_probability": 1.5})).into_report(),
            Err(ReportError::Probability(_))
        ));
        assert!(matches!(
            raw(json!({"reported_at": "yesterday"})).into_report(),
            Err(ReportError::Timestamp(_))
        ));
    }

    #[test]
    fn created_signature_targets_hostname() {
        let report = sample_report("https://news.example.org/a", "layout broken");
        let sig = report.create_signature().unwrap();
        assert_eq!(sig.hostname_domain(), Some("news.example.org"));
        assert!(sig.matches(&report));
    }
}
