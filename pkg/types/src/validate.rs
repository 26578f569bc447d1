use anyhow::{Result, bail};
use std::collections::HashSet;

use crate::pod::Pod;

/// Validate a Kubernetes-style resource name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Validate a pod before it is handed to the sync loop.
///
/// Checks the identity names, that container names are unique within each of
/// the three lists, and that sidecar annotations reference containers that
/// actually exist in the main list.
pub fn validate_pod(pod: &Pod) -> Result<()> {
    if pod.uid.is_empty() {
        bail!("pod '{}' has an empty UID", pod.name);
    }
    validate_name(&pod.name)?;
    validate_name(&pod.namespace)?;

    for (list_name, list) in [
        ("init", &pod.spec.init_containers),
        ("main", &pod.spec.containers),
        ("ephemeral", &pod.spec.ephemeral_containers),
    ] {
        let mut seen = HashSet::new();
        for c in list {
            validate_name(&c.name)?;
            if c.image.is_empty() {
                bail!("container '{}' has an empty image", c.name);
            }
            if !seen.insert(c.name.as_str()) {
                bail!(
                    "duplicate container name '{}' in {} container list",
                    c.name,
                    list_name
                );
            }
        }
    }

    if let Some(sidecars) = pod
        .annotations
        .get(pkg_constants::labels::ANNOTATION_SIDECARS)
    {
        for name in sidecars.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if !pod.spec.containers.iter().any(|c| c.name == name) {
                bail!(
                    "sidecar annotation names unknown main container '{}'",
                    name
                );
            }
        }
    }

    Ok(())
}
