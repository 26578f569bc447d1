//! Filesystem path constants.

// ─── Pod logs ──────────────────────────────────────────────────────────────

/// Root directory for per-pod container log files.
/// Ensured to exist at reconciler construction.
pub const POD_LOG_DIR: &str = "/var/log/pods";

/// Mode for `POD_LOG_DIR` when the reconciler has to create it.
pub const POD_LOG_DIR_MODE: u32 = 0o755;
