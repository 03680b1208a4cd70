//! Web-compat triage core — reports, symptoms and signatures.
//!
//! A [`Signature`] is a conjunction of [`Symptom`]s, each testing one field of a
//! [`Report`] with a [`Matcher`]. Signatures define bucket membership; this crate
//! holds everything about them that does not touch storage.

pub mod error;
pub mod matcher;
pub mod report;
pub mod signature;
pub mod symptom;

pub use error::{ReportError, SignatureError};
pub use matcher::{Field, Matcher};
pub use report::{RawReport, Report};
pub use signature::{canonicalize, Signature};
pub use symptom::{AppField, CommentSource, Symptom, UrlPart};
