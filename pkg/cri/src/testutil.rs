//! Minimal runtime fake shared by the version-cache and instrumentation
//! tests. Only `version` and `status` answer; every other operation bails.

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::client::RuntimeService;
use crate::types::{
    CONDITION_NETWORK_READY, CONDITION_RUNTIME_READY, Container, ContainerConfig, ContainerFilter,
    ContainerStatus, NetworkConfig, PodSandbox, PodSandboxConfig, PodSandboxFilter,
    PodSandboxStatus, RuntimeCondition, RuntimeStatus, VersionInfo,
};

pub(crate) struct StaticRuntime {
    api_version: String,
    pub(crate) version_calls: AtomicU32,
}

impl StaticRuntime {
    pub(crate) fn new(api_version: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            version_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl RuntimeService for StaticRuntime {
    async fn version(&self, _api_version: &str) -> Result<VersionInfo> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        Ok(VersionInfo {
            version: self.api_version.clone(),
            runtime_name: "staticruntime".to_string(),
            runtime_version: "0.0.1".to_string(),
            runtime_api_version: "v1".to_string(),
        })
    }

    async fn status(&self) -> Result<RuntimeStatus> {
        Ok(RuntimeStatus {
            conditions: vec![
                RuntimeCondition {
                    condition_type: CONDITION_RUNTIME_READY.to_string(),
                    status: true,
                    reason: String::new(),
                    message: String::new(),
                },
                RuntimeCondition {
                    condition_type: CONDITION_NETWORK_READY.to_string(),
                    status: true,
                    reason: String::new(),
                    message: String::new(),
                },
            ],
        })
    }

    async fn list_pod_sandbox(
        &self,
        _filter: Option<&PodSandboxFilter>,
    ) -> Result<Vec<PodSandbox>> {
        bail!("not wired in this fake")
    }

    async fn run_pod_sandbox(
        &self,
        _config: &PodSandboxConfig,
        _runtime_handler: &str,
    ) -> Result<String> {
        bail!("not wired in this fake")
    }

    async fn stop_pod_sandbox(&self, _id: &str) -> Result<()> {
        bail!("not wired in this fake")
    }

    async fn pod_sandbox_status(&self, _id: &str) -> Result<PodSandboxStatus> {
        bail!("not wired in this fake")
    }

    async fn list_containers(
        &self,
        _filter: Option<&ContainerFilter>,
    ) -> Result<Vec<Container>> {
        bail!("not wired in this fake")
    }

    async fn container_status(&self, _id: &str) -> Result<ContainerStatus> {
        bail!("not wired in this fake")
    }

    async fn create_container(
        &self,
        _sandbox_id: &str,
        _config: &ContainerConfig,
        _sandbox_config: &PodSandboxConfig,
    ) -> Result<String> {
        bail!("not wired in this fake")
    }

    async fn start_container(&self, _id: &str) -> Result<()> {
        bail!("not wired in this fake")
    }

    async fn stop_container(&self, _id: &str, _grace_seconds: i64) -> Result<()> {
        bail!("not wired in this fake")
    }

    async fn remove_container(&self, _id: &str) -> Result<()> {
        bail!("not wired in this fake")
    }

    async fn update_runtime_config(&self, _network: &NetworkConfig) -> Result<()> {
        bail!("not wired in this fake")
    }
}
