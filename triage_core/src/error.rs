//! Error types for report parsing and signature validation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("malformed signature JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("signature must contain at least one symptom")]
    Empty,

    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("symptom must carry exactly one of \"value\" or \"pattern\"")]
    MatcherEncoding,
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("invalid report URL {url:?}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid report timestamp {0:?}")]
    Timestamp(String),

    #[error("ML probability {0} outside [0, 1]")]
    Probability(f64),
}
