//! Signatures — ordered, deduplicated conjunctions of symptoms.
//!
//! The canonical text form (compact JSON, sorted keys, duplicates removed) is
//! what gets persisted; two signatures with the same canonical text are the
//! same signature.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::SignatureError;
use crate::matcher::Matcher;
use crate::report::Report;
use crate::symptom::{Symptom, SymptomRepr, UrlPart};

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    symptoms: Vec<Symptom>,
}

#[derive(Serialize, Deserialize)]
struct SignatureRepr {
    symptoms: Vec<SymptomRepr>,
}

impl Signature {
    /// Build a signature, dropping duplicate symptoms (first occurrence wins).
    pub fn new(symptoms: Vec<Symptom>) -> Result<Self, SignatureError> {
        let mut unique: Vec<Symptom> = Vec::with_capacity(symptoms.len());
        for symptom in symptoms {
            if !unique.contains(&symptom) {
                unique.push(symptom);
            }
        }
        if unique.is_empty() {
            return Err(SignatureError::Empty);
        }
        Ok(Self { symptoms: unique })
    }

    pub fn from_symptom(symptom: Symptom) -> Self {
        Self {
            symptoms: vec![symptom],
        }
    }

    pub fn parse(raw: &str) -> Result<Self, SignatureError> {
        let repr: SignatureRepr = serde_json::from_str(raw)?;
        Self::from_repr(repr)
    }

    pub fn from_value(value: Value) -> Result<Self, SignatureError> {
        let repr: SignatureRepr = serde_json::from_value(value)?;
        Self::from_repr(repr)
    }

    fn from_repr(repr: SignatureRepr) -> Result<Self, SignatureError> {
        let symptoms = repr
            .symptoms
            .into_iter()
            .map(Symptom::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(symptoms)
    }

    pub fn symptoms(&self) -> &[Symptom] {
        &self.symptoms
    }

    pub fn matches(&self, report: &Report) -> bool {
        self.symptoms.iter().all(|s| s.test(report))
    }

    /// Broaden this signature so it also matches `report`.
    ///
    /// Every failing symptom is widened when its matcher allows it and dropped
    /// otherwise. Returns `None` when nothing could be widened or no symptom
    /// would be left. A signature that already matches is returned unchanged.
    pub fn fit(&self, report: &Report) -> Option<Signature> {
        let mut widened_any = false;
        let mut fitted = Vec::with_capacity(self.symptoms.len());

        for symptom in &self.symptoms {
            if symptom.test(report) {
                fitted.push(symptom.clone());
            } else if let Some(widened) = symptom.widen(report) {
                widened_any = true;
                fitted.push(widened);
            }
        }

        if fitted.len() == self.symptoms.len() && !widened_any {
            return Some(self.clone());
        }
        if !widened_any {
            return None;
        }
        Signature::new(fitted).ok()
    }

    /// The hostname this signature reduces to, when it is exactly one exact
    /// hostname symptom. Drives the bucket domain shortcut.
    pub fn hostname_domain(&self) -> Option<&str> {
        match self.symptoms.as_slice() {
            [Symptom::Url {
                part: UrlPart::Hostname,
                matcher: Matcher::Exact(Value::String(host)),
            }] => Some(host.as_str()),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        let repr = SignatureRepr {
            symptoms: self.symptoms.iter().map(Symptom::to_repr).collect(),
        };
        // SymptomRepr only holds strings, enums and JSON values.
        let value = serde_json::to_value(repr).unwrap_or(Value::Null);
        sort_keys(value)
    }

    pub fn canonical(&self) -> String {
        self.to_value().to_string()
    }
}

/// Re-serialize a raw signature in canonical form.
pub fn canonicalize(raw: &str) -> Result<String, SignatureError> {
    Ok(Signature::parse(raw)?.canonical())
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect::<Map<_, _>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signature::parse(s)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Signature::from_value(value).map_err(serde::de::Error::custom)
    }
}
