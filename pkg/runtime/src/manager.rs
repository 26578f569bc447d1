//! The reconciler itself.
//!
//! `RuntimeManager` owns only the version cache and the log-reduction
//! filter; every other collaborator is injected as a narrow capability so
//! that image pulling, hook execution, probing and event delivery never
//! hold a reference back into the manager.

use std::os::unix::fs::DirBuilderExt;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use pkg_cri::client::RuntimeService;
use pkg_cri::types::{NetworkConfig, RuntimeStatus, VersionInfo};
use pkg_cri::version::{VersionCache, VersionError};

use crate::config::RuntimeConfig;
use crate::error::SyncError;
use crate::events::EventRecorder;
use crate::lifecycle::{HookRunner, InternalLifecycle};
use crate::logreduce::LogReducer;
use crate::probe::LivenessManager;
use crate::puller::ImagePuller;

pub struct RuntimeManager {
    pub(crate) config: RuntimeConfig,
    pub(crate) runtime: Arc<dyn RuntimeService>,
    pub(crate) puller: Arc<dyn ImagePuller>,
    pub(crate) recorder: Arc<dyn EventRecorder>,
    pub(crate) hooks: Arc<dyn HookRunner>,
    pub(crate) internal_lifecycle: Arc<dyn InternalLifecycle>,
    pub(crate) liveness: Arc<dyn LivenessManager>,
    pub(crate) version_cache: VersionCache,
    pub(crate) log_reducer: LogReducer,
}

impl RuntimeManager {
    /// Construct the reconciler, validating the runtime's API version and
    /// ensuring the pod log directory exists.
    ///
    /// A runtime advertising the wrong API version fails here with
    /// [`SyncError::VersionNotSupported`] (recoverable via downcast).
    pub async fn new(
        config: RuntimeConfig,
        runtime: Arc<dyn RuntimeService>,
        puller: Arc<dyn ImagePuller>,
        recorder: Arc<dyn EventRecorder>,
        hooks: Arc<dyn HookRunner>,
        internal_lifecycle: Arc<dyn InternalLifecycle>,
        liveness: Arc<dyn LivenessManager>,
    ) -> Result<Self> {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(pkg_constants::paths::POD_LOG_DIR_MODE)
            .create(&config.pod_log_dir)
            .with_context(|| format!("creating pod log directory {}", config.pod_log_dir))?;

        let version_cache = VersionCache::new(config.machine_id.clone());
        let version = version_cache
            .get(runtime.as_ref())
            .await
            .map_err(|e| match e {
                VersionError::NotSupported { got, want } => {
                    anyhow::Error::new(SyncError::VersionNotSupported { got, want })
                }
                VersionError::Upstream(e) => e.context("validating runtime version"),
            })?;
        info!(
            "validated container runtime {} {} (API {})",
            version.runtime_name, version.runtime_version, version.version
        );

        Ok(Self {
            config,
            runtime,
            puller,
            recorder,
            hooks,
            internal_lifecycle,
            liveness,
            version_cache,
            log_reducer: LogReducer::new(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Typed version info, served from the TTL cache.
    pub async fn api_version(&self) -> Result<VersionInfo> {
        Ok(self.version_cache.get(self.runtime.as_ref()).await?)
    }

    /// The runtime's name and version as a display string.
    pub async fn runtime_version(&self) -> Result<String> {
        let info = self.api_version().await?;
        Ok(format!("{} {}", info.runtime_name, info.runtime_version))
    }

    /// Current runtime readiness conditions.
    pub async fn runtime_status(&self) -> Result<RuntimeStatus> {
        self.runtime.status().await
    }

    /// Push an updated pod CIDR down to the runtime's network setup.
    pub async fn update_pod_cidr(&self, pod_cidr: &str) -> Result<()> {
        info!("updating runtime pod CIDR to {}", pod_cidr);
        self.runtime
            .update_runtime_config(&NetworkConfig {
                pod_cidr: pod_cidr.to_string(),
            })
            .await
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
