//! Desired-state data model for podsync.
//!
//! A `Pod` here is the declarative input to one sync cycle: immutable for
//! the duration of the cycle, serde-round-trippable, and carrying everything
//! the reconciler needs to plan sandbox and container operations.

pub mod pod;
pub mod validate;
