//! Triage services — business logic over a [`TriageStore`](crate::store::TriageStore).

pub mod bucket_service;
pub mod bug_service;
pub mod entry_service;
pub mod hit_service;
pub mod lookup_service;
pub mod optimize_service;
pub mod reassign_service;
