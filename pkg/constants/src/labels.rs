//! CRI label and annotation keys.
//!
//! Labels written to every created container are the only channel by which
//! pod identity survives reconciler restarts — treat them as a stable wire
//! contract.

// ─── Container labels ──────────────────────────────────────────────────────

/// UID of the pod that owns the container.
pub const LABEL_POD_UID: &str = "podsync.dev/pod-uid";

/// Name of the pod that owns the container.
pub const LABEL_POD_NAME: &str = "podsync.dev/pod-name";

/// Namespace of the pod that owns the container.
pub const LABEL_POD_NAMESPACE: &str = "podsync.dev/pod-namespace";

/// Name of the container within its pod.
pub const LABEL_CONTAINER_NAME: &str = "podsync.dev/container-name";

/// Hex digest of the container spec at creation time.
pub const LABEL_CONTAINER_HASH: &str = "podsync.dev/container-hash";

/// Decimal restart count of the container.
pub const LABEL_RESTART_COUNT: &str = "podsync.dev/restart-count";

/// Lifecycle role of the container: "init", "main", "ephemeral" or "sidecar".
pub const LABEL_CONTAINER_TYPE: &str = "podsync.dev/container-type";

// ─── Pod annotations ───────────────────────────────────────────────────────

/// Set to "true" on pods whose intended lifecycle is to run to completion.
pub const ANNOTATION_ONE_OFF: &str = "podsync.dev/one-off";

/// Comma-separated names of main-list containers classified as sidecars.
pub const ANNOTATION_SIDECARS: &str = "podsync.dev/sidecars";
