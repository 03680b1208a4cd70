//! Triage data models.

pub mod bucket;
pub mod bug;
pub mod entry;
pub mod hit;
