//! CRI labels written to every created container.
//!
//! Labels are the only channel by which pod identity, spec hash, and
//! restart count survive reconciler restarts. Parsing is lossy by design:
//! containers with malformed labels are dropped with a debug log rather
//! than failing the listing.

use std::collections::HashMap;

use tracing::debug;

use pkg_constants::labels as keys;
use pkg_types::pod::{ContainerKind, ContainerSpec, Pod};

/// Identity recovered from a container's labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLabels {
    pub pod_uid: String,
    pub pod_name: String,
    pub pod_namespace: String,
    pub container_name: String,
    pub container_hash: String,
    pub restart_count: u32,
    pub kind: ContainerKind,
}

/// Build the label set stamped onto a created container.
pub fn container_labels(
    pod: &Pod,
    container: &ContainerSpec,
    kind: ContainerKind,
    hash: &str,
    restart_count: u32,
) -> HashMap<String, String> {
    HashMap::from([
        (keys::LABEL_POD_UID.to_string(), pod.uid.clone()),
        (keys::LABEL_POD_NAME.to_string(), pod.name.clone()),
        (keys::LABEL_POD_NAMESPACE.to_string(), pod.namespace.clone()),
        (
            keys::LABEL_CONTAINER_NAME.to_string(),
            container.name.clone(),
        ),
        (keys::LABEL_CONTAINER_HASH.to_string(), hash.to_string()),
        (
            keys::LABEL_RESTART_COUNT.to_string(),
            restart_count.to_string(),
        ),
        (
            keys::LABEL_CONTAINER_TYPE.to_string(),
            kind.as_str().to_string(),
        ),
    ])
}

/// Recover container identity from labels. Returns `None` (after a debug
/// log) when any required label is missing or unparseable.
pub fn parse_container_labels(labels: &HashMap<String, String>) -> Option<ContainerLabels> {
    let required = |key: &str| -> Option<String> {
        let value = labels.get(key);
        if value.is_none() {
            debug!("container labels missing {}", key);
        }
        value.cloned()
    };

    let restart_count = match required(keys::LABEL_RESTART_COUNT)?.parse::<u32>() {
        Ok(n) => n,
        Err(e) => {
            debug!("container label {} unparseable: {}", keys::LABEL_RESTART_COUNT, e);
            return None;
        }
    };
    let kind_raw = required(keys::LABEL_CONTAINER_TYPE)?;
    let Some(kind) = ContainerKind::parse(&kind_raw) else {
        debug!(
            "container label {} has unknown value {:?}",
            keys::LABEL_CONTAINER_TYPE,
            kind_raw
        );
        return None;
    };

    Some(ContainerLabels {
        pod_uid: required(keys::LABEL_POD_UID)?,
        pod_name: required(keys::LABEL_POD_NAME)?,
        pod_namespace: required(keys::LABEL_POD_NAMESPACE)?,
        container_name: required(keys::LABEL_CONTAINER_NAME)?,
        container_hash: required(keys::LABEL_CONTAINER_HASH)?,
        restart_count,
        kind,
    })
}

/// The spec hash recorded at creation time, if present.
pub fn container_hash_from_labels(labels: &HashMap<String, String>) -> Option<&str> {
    labels.get(keys::LABEL_CONTAINER_HASH).map(String::as_str)
}

/// The restart count recorded at creation time, if present and parseable.
pub fn restart_count_from_labels(labels: &HashMap<String, String>) -> Option<u32> {
    labels
        .get(keys::LABEL_RESTART_COUNT)
        .and_then(|v| v.parse().ok())
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{simple_container, simple_pod};

    #[test]
    fn test_label_round_trip() {
        let pod = simple_pod("u1", "web", &[simple_container("app", "nginx:latest")]);
        let labels = container_labels(
            &pod,
            &pod.spec.containers[0],
            ContainerKind::Main,
            "abcd1234abcd1234",
            3,
        );

        let parsed = parse_container_labels(&labels).expect("labels parse");
        assert_eq!(parsed.pod_uid, "u1");
        assert_eq!(parsed.pod_name, "web");
        assert_eq!(parsed.pod_namespace, "default");
        assert_eq!(parsed.container_name, "app");
        assert_eq!(parsed.container_hash, "abcd1234abcd1234");
        assert_eq!(parsed.restart_count, 3);
        assert_eq!(parsed.kind, ContainerKind::Main);
    }

    #[test]
    fn test_malformed_labels_drop() {
        let pod = simple_pod("u1", "web", &[simple_container("app", "nginx:latest")]);
        let good = container_labels(&pod, &pod.spec.containers[0], ContainerKind::Main, "h", 0);

        let mut missing = good.clone();
        missing.remove(pkg_constants::labels::LABEL_POD_UID);
        assert!(parse_container_labels(&missing).is_none());

        let mut bad_count = good.clone();
        bad_count.insert(
            pkg_constants::labels::LABEL_RESTART_COUNT.to_string(),
            "many".to_string(),
        );
        assert!(parse_container_labels(&bad_count).is_none());

        let mut bad_kind = good;
        bad_kind.insert(
            pkg_constants::labels::LABEL_CONTAINER_TYPE.to_string(),
            "helper".to_string(),
        );
        assert!(parse_container_labels(&bad_kind).is_none());
    }

    #[test]
    fn test_hash_and_restart_accessors() {
        let pod = simple_pod("u1", "web", &[simple_container("app", "nginx:latest")]);
        let labels = container_labels(&pod, &pod.spec.containers[0], ContainerKind::Main, "h1", 7);
        assert_eq!(container_hash_from_labels(&labels), Some("h1"));
        assert_eq!(restart_count_from_labels(&labels), Some(7));
        assert_eq!(restart_count_from_labels(&HashMap::new()), None);
    }
}
