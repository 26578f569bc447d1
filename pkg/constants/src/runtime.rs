//! Container runtime constants.

/// CRI API version the reconciler requires the runtime to advertise.
pub const RUNTIME_API_VERSION: &str = "0.1.0";

/// How long a cached `Version` response stays valid, in seconds.
pub const VERSION_CACHE_TTL_SECONDS: u64 = 60;

/// Window within which identical CRI error messages for the same pod are
/// printed at most once, in seconds.
pub const LOG_REDUCTION_WINDOW_SECONDS: u64 = 60;

/// Grace period applied when a pod spec does not carry one, in seconds.
pub const DEFAULT_KILL_GRACE_SECONDS: i64 = 30;

/// Floor applied to any positive grace period so containers get a chance to
/// handle SIGTERM before SIGKILL, in seconds.
pub const MIN_KILL_GRACE_SECONDS: i64 = 2;

/// First restart backoff slot, in seconds.
pub const BACKOFF_INITIAL_SECONDS: u64 = 10;

/// Upper bound on a single restart backoff slot, in seconds.
pub const BACKOFF_CAP_SECONDS: u64 = 300;
