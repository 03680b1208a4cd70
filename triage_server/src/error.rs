//! Error types for the triage services and storage backends.

use thiserror::Error;
use triage_core::{ReportError, SignatureError};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("invalid signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("invalid report: {0}")]
    Report(#[from] ReportError),

    #[error("priority {0} outside [-2, 2]")]
    InvalidPriority(i32),

    #[error("invalid pagination: {0}")]
    InvalidPagination(&'static str),

    #[error("report {0} already exists")]
    DuplicateReport(Uuid),

    #[error("{0} not found")]
    NotFound(String),

    #[error("reassignment already in progress for bucket {0}")]
    ReassignInProgress(i64),

    #[error("unknown bug provider {0:?}")]
    UnknownProvider(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("pool error: {0}")]
    Pool(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TriageError {
    /// Validation failures are rejected before anything is persisted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TriageError::Signature(_)
                | TriageError::Report(_)
                | TriageError::InvalidPriority(_)
                | TriageError::InvalidPagination(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
