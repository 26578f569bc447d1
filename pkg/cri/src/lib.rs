//! CRI-facing layer: the observed-state wire types, the narrow service
//! traits the reconciler consumes, an instrumentation wrapper, and a
//! TTL-bounded version cache.
//!
//! The transport itself (gRPC, UNIX socket, test double) lives behind the
//! [`client::RuntimeService`] trait — this crate never dials anything.

pub mod client;
pub mod instrument;
pub mod types;
pub mod version;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::{ImageService, RuntimeService};
pub use instrument::InstrumentedRuntime;
pub use version::{VersionCache, VersionError};
