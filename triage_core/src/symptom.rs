//! Symptoms — single-field predicates over a report.
//!
//! On the wire a symptom is a JSON object tagged by `"type"`, carrying its
//! field selector and exactly one of `"value"` (exact) or `"pattern"` (regex):
//!
//! ```json
//! {"type": "url", "part": "hostname", "value": "example.com"}
//! {"type": "comments", "pattern": "(?i)video"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SignatureError;
use crate::matcher::{Field, Matcher};
use crate::report::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlPart {
    Scheme,
    Hostname,
    Port,
    Path,
    Query,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppField {
    Name,
    Channel,
    Version,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentSource {
    #[default]
    Original,
    Translated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Symptom {
    Url { part: UrlPart, matcher: Matcher },
    App { field: AppField, matcher: Matcher },
    BreakageCategory { matcher: Matcher },
    Comments { source: CommentSource, matcher: Matcher },
    Os { matcher: Matcher },
    Details { path: Vec<String>, matcher: Matcher },
}

impl Symptom {
    pub fn matcher(&self) -> &Matcher {
        match self {
            Symptom::Url { matcher, .. }
            | Symptom::App { matcher, .. }
            | Symptom::BreakageCategory { matcher }
            | Symptom::Comments { matcher, .. }
            | Symptom::Os { matcher }
            | Symptom::Details { matcher, .. } => matcher,
        }
    }

    fn with_matcher(&self, matcher: Matcher) -> Symptom {
        match self {
            Symptom::Url { part, .. } => Symptom::Url { part: *part, matcher },
            Symptom::App { field, .. } => Symptom::App { field: *field, matcher },
            Symptom::BreakageCategory { .. } => Symptom::BreakageCategory { matcher },
            Symptom::Comments { source, .. } => Symptom::Comments { source: *source, matcher },
            Symptom::Os { .. } => Symptom::Os { matcher },
            Symptom::Details { path, .. } => Symptom::Details { path: path.clone(), matcher },
        }
    }

    /// The report field this symptom inspects, or `None` when absent.
    pub fn field<'r>(&self, report: &'r Report) -> Option<Field<'r>> {
        match self {
            Symptom::Url { part, .. } => {
                let url = &report.url;
                match part {
                    UrlPart::Scheme => Some(Field::Text(url.scheme())),
                    UrlPart::Hostname => url.host_str().map(Field::Text),
                    UrlPart::Port => url.port().map(|p| Field::Number(u64::from(p))),
                    UrlPart::Path => Some(Field::Text(url.path())),
                    UrlPart::Query => url.query().map(Field::Text),
                    UrlPart::Fragment => url.fragment().map(Field::Text),
                }
            }
            Symptom::App { field, .. } => match field {
                AppField::Name => Some(Field::Text(&report.app_name)),
                AppField::Channel => report.app_channel.as_deref().map(Field::Text),
                AppField::Version => Some(Field::Text(&report.app_version)),
            },
            Symptom::BreakageCategory { .. } => {
                report.breakage_category.as_deref().map(Field::Text)
            }
            Symptom::Comments { source, .. } => match source {
                CommentSource::Original => Some(Field::Text(&report.comments)),
                CommentSource::Translated => {
                    report.comments_translated.as_deref().map(Field::Text)
                }
            },
            Symptom::Os { .. } => Some(Field::Text(&report.os)),
            Symptom::Details { path, .. } => {
                let mut node = &report.details;
                for key in path {
                    node = node.as_object()?.get(key)?;
                }
                Some(Field::Json(node))
            }
        }
    }

    pub fn test(&self, report: &Report) -> bool {
        self.field(report)
            .is_some_and(|field| self.matcher().test(field))
    }

    /// A copy of this symptom whose matcher also accepts `report`'s value.
    pub fn widen(&self, report: &Report) -> Option<Symptom> {
        let field = self.field(report)?;
        let matcher = self.matcher().widen(field)?;
        Some(self.with_matcher(matcher))
    }

    pub(crate) fn to_repr(&self) -> SymptomRepr {
        let matcher = MatcherRepr::from(self.matcher());
        match self {
            Symptom::Url { part, .. } => SymptomRepr::Url { part: *part, matcher },
            Symptom::App { field, .. } => SymptomRepr::App { field: *field, matcher },
            Symptom::BreakageCategory { .. } => SymptomRepr::BreakageCategory { matcher },
            Symptom::Comments { source, .. } => SymptomRepr::Comments { source: *source, matcher },
            Symptom::Os { .. } => SymptomRepr::Os { matcher },
            Symptom::Details { path, .. } => SymptomRepr::Details { path: path.clone(), matcher },
        }
    }
}

/// Serialized form of a symptom.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum SymptomRepr {
    Url {
        part: UrlPart,
        #[serde(flatten)]
        matcher: MatcherRepr,
    },
    App {
        field: AppField,
        #[serde(flatten)]
        matcher: MatcherRepr,
    },
    BreakageCategory {
        #[serde(flatten)]
        matcher: MatcherRepr,
    },
    Comments {
        #[serde(default)]
        source: CommentSource,
        #[serde(flatten)]
        matcher: MatcherRepr,
    },
    Os {
        #[serde(flatten)]
        matcher: MatcherRepr,
    },
    Details {
        path: Vec<String>,
        #[serde(flatten)]
        matcher: MatcherRepr,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct MatcherRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
}

impl From<&Matcher> for MatcherRepr {
    fn from(matcher: &Matcher) -> Self {
        match matcher {
            Matcher::Exact(v) => MatcherRepr {
                value: Some(v.clone()),
                pattern: None,
            },
            Matcher::Pattern(p) => MatcherRepr {
                value: None,
                pattern: Some(p.as_str().to_string()),
            },
        }
    }
}

impl TryFrom<MatcherRepr> for Matcher {
    type Error = SignatureError;

    fn try_from(repr: MatcherRepr) -> Result<Self, Self::Error> {
        match (repr.value, repr.pattern) {
            (Some(value), None) => Ok(Matcher::Exact(value)),
            (None, Some(pattern)) => Matcher::pattern(pattern),
            _ => Err(SignatureError::MatcherEncoding),
        }
    }
}

impl TryFrom<SymptomRepr> for Symptom {
    type Error = SignatureError;

    fn try_from(repr: SymptomRepr) -> Result<Self, Self::Error> {
        Ok(match repr {
            SymptomRepr::Url { part, matcher } => Symptom::Url {
                part,
                matcher: matcher.try_into()?,
            },
            SymptomRepr::App { field, matcher } => Symptom::App {
                field,
                matcher: matcher.try_into()?,
            },
            SymptomRepr::BreakageCategory { matcher } => Symptom::BreakageCategory {
                matcher: matcher.try_into()?,
            },
            SymptomRepr::Comments { source, matcher } => Symptom::Comments {
                source,
                matcher: matcher.try_into()?,
            },
            SymptomRepr::Os { matcher } => Symptom::Os {
                matcher: matcher.try_into()?,
            },
            SymptomRepr::Details { path, matcher } => Symptom::Details {
                path,
                matcher: matcher.try_into()?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_report;
    use serde_json::json;

    #[test]
    fn url_parts_are_extracted() {
        let report = sample_report("https://www.example.com:8443/watch?v=1#t", "video broken");
        let host = Symptom::Url {
            part: UrlPart::Hostname,
            matcher: Matcher::exact("www.example.com"),
        };
        let port = Symptom::Url {
            part: UrlPart::Port,
            matcher: Matcher::exact(8443),
        };
        let query = Symptom::Url {
            part: UrlPart::Query,
            matcher: Matcher::pattern("v=\\d").unwrap(),
        };
        assert!(host.test(&report));
        assert!(port.test(&report));
        assert!(query.test(&report));
    }

    #[test]
    fn absent_fields_never_match() {
        let report = sample_report("https://example.com/", "broken");
        let fragment = Symptom::Url {
            part: UrlPart::Fragment,
            matcher: Matcher::pattern("").unwrap(),
        };
        let translated = Symptom::Comments {
            source: CommentSource::Translated,
            matcher: Matcher::pattern(".*").unwrap(),
        };
        let missing_detail = Symptom::Details {
            path: vec!["nope".into()],
            matcher: Matcher::pattern(".*").unwrap(),
        };
        assert!(!fragment.test(&report));
        assert!(!translated.test(&report));
        assert!(!missing_detail.test(&report));
    }

    #[test]
    fn app_fields_are_selected() {
        let mut report = sample_report("https://example.com/", "broken");
        let name = Symptom::App {
            field: AppField::Name,
            matcher: Matcher::exact("Firefox"),
        };
        let version = Symptom::App {
            field: AppField::Version,
            matcher: Matcher::pattern("^128\\.").unwrap(),
        };
        let channel = Symptom::App {
            field: AppField::Channel,
            matcher: Matcher::exact("release"),
        };
        assert!(name.test(&report));
        assert!(version.test(&report));
        assert!(channel.test(&report));

        let nightly = Symptom::App {
            field: AppField::Channel,
            matcher: Matcher::exact("nightly"),
        };
        assert!(!nightly.test(&report));

        report.app_channel = None;
        let any_channel = Symptom::App {
            field: AppField::Channel,
            matcher: Matcher::pattern(".*").unwrap(),
        };
        assert!(!channel.test(&report));
        assert!(!any_channel.test(&report));
        assert!(any_channel.widen(&report).is_none());
    }

    #[test]
    fn breakage_category_and_os_are_selected() {
        let mut report = sample_report("https://example.com/", "broken");
        let media = Symptom::BreakageCategory {
            matcher: Matcher::exact("media"),
        };
        let linux = Symptom::Os {
            matcher: Matcher::exact("Linux"),
        };
        let windows = Symptom::Os {
            matcher: Matcher::pattern("^Windows").unwrap(),
        };
        assert!(media.test(&report));
        assert!(linux.test(&report));
        assert!(!windows.test(&report));

        report.breakage_category = None;
        assert!(!media.test(&report));
    }

    #[test]
    fn details_path_walks_nested_objects() {
        let mut report = sample_report("https://example.com/", "broken");
        report.details = json!({"gfx": {"driver": "nvidia", "layers": 3}});
        let driver = Symptom::Details {
            path: vec!["gfx".into(), "driver".into()],
            matcher: Matcher::exact("nvidia"),
        };
        let layers = Symptom::Details {
            path: vec!["gfx".into(), "layers".into()],
            matcher: Matcher::pattern("^3$").unwrap(),
        };
        assert!(driver.test(&report));
        assert!(layers.test(&report));
    }

    #[test]
    fn repr_rejects_ambiguous_matchers() {
        let both: SymptomRepr =
            serde_json::from_value(json!({"type": "os", "value": "Linux", "pattern": "Lin"}))
                .unwrap();
        assert!(matches!(
            Symptom::try_from(both),
            Err(SignatureError::MatcherEncoding)
        ));

        let neither: SymptomRepr = serde_json::from_value(json!({"type": "os"})).unwrap();
        assert!(Symptom::try_from(neither).is_err());
    }
}
