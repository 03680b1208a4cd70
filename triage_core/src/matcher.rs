//! Value matchers: exact comparison or regular-expression search.

use regex::Regex;
use serde_json::Value;

use crate::error::SignatureError;

/// Minimum number of anchored characters (common prefix + suffix) a widened
/// pattern must keep. Anything shorter would match almost every value.
pub const MIN_FIT_ANCHOR: usize = 3;

/// A report field value as seen by a matcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    Text(&'a str),
    Number(u64),
    Json(&'a Value),
}

impl<'a> Field<'a> {
    /// The value as text, if it is textual.
    pub fn as_text(&self) -> Option<&'a str> {
        match *self {
            Field::Text(s) => Some(s),
            Field::Json(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Matcher {
    /// Equality against a reference value.
    Exact(Value),
    /// Regex search (not full match) against the stringified value.
    Pattern(Pattern),
}

#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Matcher::Exact(a), Matcher::Exact(b)) => a == b,
            (Matcher::Pattern(a), Matcher::Pattern(b)) => a == b,
            _ => false,
        }
    }
}

impl Matcher {
    pub fn exact(value: impl Into<Value>) -> Self {
        Matcher::Exact(value.into())
    }

    pub fn pattern(source: impl Into<String>) -> Result<Self, SignatureError> {
        let source = source.into();
        let regex = Regex::new(&source).map_err(|e| SignatureError::Pattern {
            pattern: source.clone(),
            source: e,
        })?;
        Ok(Matcher::Pattern(Pattern { source, regex }))
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Matcher::Exact(_))
    }

    pub fn test(&self, field: Field<'_>) -> bool {
        match self {
            Matcher::Exact(expected) => match (expected, field) {
                (Value::String(s), Field::Text(t)) => s == t,
                (_, Field::Text(_)) => false,
                (expected, Field::Number(n)) => expected.as_u64() == Some(n),
                (expected, Field::Json(actual)) => expected == actual,
            },
            Matcher::Pattern(p) => match field {
                Field::Text(t) => p.regex.is_match(t),
                Field::Json(Value::String(s)) => p.regex.is_match(s),
                Field::Json(other) => p.regex.is_match(&other.to_string()),
                Field::Number(n) => p.regex.is_match(&n.to_string()),
            },
        }
    }

    /// Widen an exact string matcher into a pattern that matches both the
    /// reference value and `observed`, anchored on their common prefix and
    /// suffix. Returns `None` when the matcher cannot be widened.
    pub fn widen(&self, observed: Field<'_>) -> Option<Matcher> {
        let Matcher::Exact(Value::String(reference)) = self else {
            return None;
        };
        let observed = observed.as_text()?;

        let prefix_len = common_prefix_len(reference, observed);
        let (ref_rest, obs_rest) = (&reference[prefix_len..], &observed[prefix_len..]);
        let suffix_len = common_suffix_len(ref_rest, obs_rest);

        let prefix = &reference[..prefix_len];
        let suffix = &ref_rest[ref_rest.len() - suffix_len..];
        if prefix.chars().count() + suffix.chars().count() < MIN_FIT_ANCHOR {
            return None;
        }

        let source = format!(
            "^{}(?s:.*){}$",
            regex::escape(prefix),
            regex::escape(suffix)
        );
        Matcher::pattern(source).ok()
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .take_while(|((_, x), y)| x == y)
        .last()
        .map_or(0, |((i, c), _)| i + c.len_utf8())
}

fn common_suffix_len(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .map(|(c, _)| c.len_utf8())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exact_compares_text_and_json() {
        let m = Matcher::exact("example.com");
        assert!(m.test(Field::Text("example.com")));
        assert!(!m.test(Field::Text("www.example.com")));
        assert!(m.test(Field::Json(&json!("example.com"))));

        let n = Matcher::exact(8080);
        assert!(n.test(Field::Number(8080)));
        assert!(!n.test(Field::Text("8080")));
    }

    #[test]
    fn pattern_searches_instead_of_full_match() {
        let m = Matcher::pattern("video").unwrap();
        assert!(m.test(Field::Text("the video does not play")));
        assert!(!m.test(Field::Text("audio only")));
        assert!(m.test(Field::Json(&json!({"kind": "video"}))));
        assert!(Matcher::pattern("^80").unwrap().test(Field::Number(8080)));
        assert!(!Matcher::pattern("^90").unwrap().test(Field::Number(8080)));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(matches!(
            Matcher::pattern("(unclosed"),
            Err(SignatureError::Pattern { .. })
        ));
    }

    #[test]
    fn widen_anchors_on_common_affixes() {
        let m = Matcher::exact("www.example.com");
        let widened = m.widen(Field::Text("m.example.com")).unwrap();
        match &widened {
            Matcher::Pattern(p) => assert_eq!(p.as_str(), r"^(?s:.*)\.example\.com$"),
            Matcher::Exact(_) => panic!("expected a pattern"),
        }
        assert!(widened.test(Field::Text("www.example.com")));
        assert!(widened.test(Field::Text("m.example.com")));
        assert!(!widened.test(Field::Text("example.org")));
    }

    #[test]
    fn widen_handles_multiline_and_unicode() {
        let m = Matcher::exact("Vidéo ne marche pas");
        let widened = m.widen(Field::Text("Vidéo\nne charge pas")).unwrap();
        assert!(widened.test(Field::Text("Vidéo ne marche pas")));
        assert!(widened.test(Field::Text("Vidéo\nne charge pas")));
    }

    #[test]
    fn widen_refuses_short_anchors_and_patterns() {
        assert!(Matcher::exact("abc").widen(Field::Text("xyz")).is_none());
        assert!(Matcher::exact(42).widen(Field::Text("42")).is_none());
        assert!(Matcher::pattern("a+")
            .unwrap()
            .widen(Field::Text("bbb"))
            .is_none());
        assert!(Matcher::exact("abc").widen(Field::Number(3)).is_none());
    }
}
