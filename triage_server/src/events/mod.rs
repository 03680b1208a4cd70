//! Side effects of bucket membership changes.
//!
//! Membership transitions return their events instead of firing them; the
//! caller hands them to an [`EventSink`].

pub mod membership;

pub use membership::{EventSink, MembershipChange, TracingSink, TriageEvent};
