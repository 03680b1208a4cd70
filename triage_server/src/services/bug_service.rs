//! External bug trackers and bug records linked to buckets.

use crate::error::{Result, TriageError};
use crate::models::bug::{Bug, BugProvider, NewBug, NewBugProvider};
use crate::store::TriageStore;

/// Tracker classnames accepted for bug providers.
pub const TRACKERS: &[&str] = &["BugzillaProvider", "GithubProvider"];

pub trait BugTracker: Send + Sync {
    fn classname(&self) -> &'static str;

    /// Link used when the provider has no usable URL template.
    fn default_url(&self, hostname: &str, external_id: &str) -> String;

    /// Link to `external_id`; `%s` in the provider template is replaced.
    fn bug_url(&self, provider: &BugProvider, external_id: &str) -> String {
        if provider.url_template.contains("%s") {
            provider.url_template.replace("%s", external_id)
        } else {
            self.default_url(&provider.hostname, external_id)
        }
    }
}

pub struct BugzillaTracker;

impl BugTracker for BugzillaTracker {
    fn classname(&self) -> &'static str {
        "BugzillaProvider"
    }

    fn default_url(&self, hostname: &str, external_id: &str) -> String {
        format!("https://{hostname}/show_bug.cgi?id={external_id}")
    }
}

pub struct GithubTracker;

impl BugTracker for GithubTracker {
    fn classname(&self) -> &'static str {
        "GithubProvider"
    }

    fn default_url(&self, hostname: &str, external_id: &str) -> String {
        format!("https://{hostname}/issues/{external_id}")
    }
}

/// Look up a tracker implementation by classname.
pub fn tracker_for(classname: &str) -> Result<Box<dyn BugTracker>> {
    match classname {
        "BugzillaProvider" => Ok(Box::new(BugzillaTracker)),
        "GithubProvider" => Ok(Box::new(GithubTracker)),
        other => Err(TriageError::UnknownProvider(other.to_string())),
    }
}

/// Register a bug provider. The classname must name a known tracker.
pub async fn register_provider(
    store: &dyn TriageStore,
    classname: &str,
    hostname: &str,
    url_template: &str,
) -> Result<BugProvider> {
    tracker_for(classname)?;
    let provider = store
        .create_bug_provider(NewBugProvider {
            classname: classname.to_string(),
            hostname: hostname.to_string(),
            url_template: url_template.to_string(),
        })
        .await?;
    tracing::info!(provider_id = provider.id, classname, hostname, "Bug provider registered");
    Ok(provider)
}

pub async fn create_bug(store: &dyn TriageStore, provider_id: i64, external_id: &str) -> Result<Bug> {
    store
        .create_bug(NewBug {
            external_id: external_id.to_string(),
            provider_id,
        })
        .await
}

/// Display link for a stored bug.
pub async fn bug_url(store: &dyn TriageStore, bug_id: i64) -> Result<String> {
    let (bug, provider) = store
        .get_bug(bug_id)
        .await?
        .ok_or_else(|| TriageError::NotFound(format!("bug {bug_id}")))?;
    let tracker = tracker_for(&provider.classname)?;
    Ok(tracker.bug_url(&provider, &bug.external_id))
}
