//! Reconciler configuration.
//!
//! Everything arrives here at construction — the reconciler reads no CLI
//! flags, no environment variables, and persists nothing.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Stable identity of this machine; keys the version cache.
    pub machine_id: String,

    /// Addresses reported for host-network pods, primary first.
    pub node_ips: Vec<String>,

    /// Feature gate for the ephemeral-containers path.
    pub ephemeral_containers: bool,

    /// Whether to translate CPU requests into CFS quota on created
    /// containers.
    pub cpu_cfs_quota: bool,

    /// CFS quota period in microseconds.
    pub cpu_cfs_quota_period_us: u64,

    /// Hold a global lock across image pulls so only one runs at a time.
    pub serialize_image_pulls: bool,

    /// Sustained image pulls per second admitted by the puller. Zero
    /// disables rate limiting.
    pub image_pull_qps: f32,

    /// Pull bursts admitted above the sustained rate.
    pub image_pull_burst: u32,

    /// First back-off slot after a failed image pull.
    pub image_backoff_initial: Duration,

    /// Cap on the image pull back-off slot.
    pub image_backoff_cap: Duration,

    /// Root directory for seccomp profiles referenced by created containers.
    /// Empty disables the annotation.
    pub seccomp_profile_root: String,

    /// CRI runtime handler used when a pod spec does not pick one.
    pub default_runtime_handler: String,

    /// Root directory for per-pod log files. Created at construction.
    pub pod_log_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            machine_id: String::new(),
            node_ips: Vec::new(),
            ephemeral_containers: false,
            cpu_cfs_quota: true,
            cpu_cfs_quota_period_us: 100_000,
            serialize_image_pulls: false,
            image_pull_qps: 5.0,
            image_pull_burst: 10,
            image_backoff_initial: Duration::from_secs(
                pkg_constants::runtime::BACKOFF_INITIAL_SECONDS,
            ),
            image_backoff_cap: Duration::from_secs(pkg_constants::runtime::BACKOFF_CAP_SECONDS),
            seccomp_profile_root: String::new(),
            default_runtime_handler: String::new(),
            pod_log_dir: pkg_constants::paths::POD_LOG_DIR.to_string(),
        }
    }
}
