//! Web-compat report triage — bucket storage, reassignment and optimization
//! services on top of the `triage_core` matching engine.

pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod migration;
pub mod models;
pub mod schema;
pub mod services;
pub mod store;

pub use error::{Result, TriageError};
