//! Failure kinds and per-operation sync accounting.
//!
//! Every operation the executor performs lands in a [`SyncResult`]; a
//! cycle's results aggregate into a [`PodSyncResult`] the higher layer
//! consumes. Failure kinds are distinguishable so callers can react to a
//! back-off refusal differently from a dead runtime.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The runtime does not speak the required CRI API version. Fatal at
    /// construction.
    #[error("runtime API version {got:?} is not supported, need {want:?}")]
    VersionNotSupported { got: String, want: String },

    #[error("failed to create pod sandbox: {0}")]
    CreatePodSandbox(anyhow::Error),

    #[error("failed to build pod sandbox configuration: {0}")]
    ConfigPodSandbox(anyhow::Error),

    #[error("failed to stop pod sandbox: {0}")]
    KillPodSandbox(anyhow::Error),

    #[error("failed to start container: {0}")]
    StartContainer(anyhow::Error),

    #[error("failed to stop container: {0}")]
    KillContainer(anyhow::Error),

    #[error("container image failed non-root verification: {0}")]
    VerifyNonRoot(anyhow::Error),

    #[error("pre-start hook failed: {0}")]
    PreStartHook(anyhow::Error),

    #[error("post-start hook failed: {0}")]
    PostStartHook(anyhow::Error),

    #[error("failed to pull image {image:?}: {source}")]
    ImagePull { image: String, source: anyhow::Error },

    #[error("pull of image {image:?} is in back-off")]
    ImagePullBackOff { image: String },

    #[error("failed to inspect image {image:?}: {source}")]
    ImageInspect { image: String, source: anyhow::Error },

    #[error("image registry unavailable for {image:?}: {source}")]
    RegistryUnavailable { image: String, source: anyhow::Error },

    /// Refusal to start a container that has been failing repeatedly.
    #[error("container {container:?} start refused: crash-loop back-off")]
    CrashLoopBackOff { container: String },
}

/// The operation a [`SyncResult`] accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncActionKind {
    CreatePodSandbox,
    ConfigPodSandbox,
    KillPodSandbox,
    StartContainer,
    KillContainer,
}

impl std::fmt::Display for SyncActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncActionKind::CreatePodSandbox => write!(f, "CreatePodSandbox"),
            SyncActionKind::ConfigPodSandbox => write!(f, "ConfigPodSandbox"),
            SyncActionKind::KillPodSandbox => write!(f, "KillPodSandbox"),
            SyncActionKind::StartContainer => write!(f, "StartContainer"),
            SyncActionKind::KillContainer => write!(f, "KillContainer"),
        }
    }
}

/// Outcome of one runtime operation within a sync cycle.
#[derive(Debug)]
pub struct SyncResult {
    pub action: SyncActionKind,
    /// What the operation acted on: a container name or a sandbox id.
    pub target: String,
    pub error: Option<SyncError>,
    pub message: String,
}

impl SyncResult {
    pub fn ok(action: SyncActionKind, target: impl Into<String>) -> Self {
        Self {
            action,
            target: target.into(),
            error: None,
            message: String::new(),
        }
    }

    pub fn fail(action: SyncActionKind, target: impl Into<String>, error: SyncError) -> Self {
        let message = error.to_string();
        Self {
            action,
            target: target.into(),
            error: Some(error),
            message,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated outcome of one sync cycle.
#[derive(Debug, Default)]
pub struct PodSyncResult {
    pub results: Vec<SyncResult>,
}

impl PodSyncResult {
    pub fn add(&mut self, result: SyncResult) {
        self.results.push(result);
    }

    pub fn extend(&mut self, other: PodSyncResult) {
        self.results.extend(other.results);
    }

    /// True when every recorded operation succeeded.
    pub fn succeeded(&self) -> bool {
        self.results.iter().all(SyncResult::succeeded)
    }

    /// The first failure, if any.
    pub fn first_error(&self) -> Option<&SyncError> {
        self.results.iter().find_map(|r| r.error.as_ref())
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
