//! Stable container spec hashing.
//!
//! The hash recorded in a container's labels at creation time is compared
//! against the hash of the current spec entry to detect drift. It must be
//! stable across processes and insensitive to `HashMap` iteration order, so
//! the spec is canonicalized (env sorted) before digesting.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use pkg_types::pod::{ContainerSpec, Probe, ResourceRequirements};

/// Canonical, deterministic projection of a `ContainerSpec`. Every
/// user-visible field participates; adding a spec field without adding it
/// here would make drift in that field invisible.
#[derive(Serialize)]
struct CanonicalSpec<'a> {
    name: &'a str,
    image: &'a str,
    command: &'a [String],
    args: &'a [String],
    env: BTreeMap<&'a str, &'a str>,
    working_dir: Option<&'a str>,
    resources: &'a ResourceRequirements,
    liveness_probe: Option<&'a Probe>,
    pre_stop_exec: &'a [String],
    post_start_exec: &'a [String],
}

impl<'a> From<&'a ContainerSpec> for CanonicalSpec<'a> {
    fn from(spec: &'a ContainerSpec) -> Self {
        Self {
            name: &spec.name,
            image: &spec.image,
            command: &spec.command,
            args: &spec.args,
            env: spec
                .env
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            working_dir: spec.working_dir.as_deref(),
            resources: &spec.resources,
            liveness_probe: spec.liveness_probe.as_ref(),
            pre_stop_exec: &spec.pre_stop_exec,
            post_start_exec: &spec.post_start_exec,
        }
    }
}

/// Hex digest of the canonicalized spec, truncated to 16 characters for the
/// label channel.
pub fn container_spec_hash(spec: &ContainerSpec) -> String {
    let canonical = CanonicalSpec::from(spec);
    let bytes =
        serde_json::to_vec(&canonical).expect("canonical container spec serializes to JSON");
    let digest = Sha256::digest(&bytes);
    hex::encode(&digest[..8])
}

// ─── Tests ─────────────────────────────────────────────────────────────────
