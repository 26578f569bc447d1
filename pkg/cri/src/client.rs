use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    Container, ContainerConfig, ContainerFilter, ContainerStatus, NetworkConfig, PodSandbox,
    PodSandboxConfig, PodSandboxFilter, PodSandboxStatus, RuntimeStatus, VersionInfo,
};

/// The narrow CRI runtime facade the reconciler consumes.
///
/// Every call maps to a single blocking RPC: no retries, no internal
/// concurrency. Cancellation is the caller's concern — dropping the future
/// aborts the call and the current sync phase fails as if the runtime had
/// errored.
#[async_trait]
pub trait RuntimeService: Send + Sync {
    /// Report runtime name/version for the given client API version.
    async fn version(&self, api_version: &str) -> Result<VersionInfo>;

    /// Report runtime and network readiness conditions.
    async fn status(&self) -> Result<RuntimeStatus>;

    /// List sandboxes matching the filter (all when `None`).
    async fn list_pod_sandbox(&self, filter: Option<&PodSandboxFilter>)
    -> Result<Vec<PodSandbox>>;

    /// Create and start a sandbox; returns its id.
    async fn run_pod_sandbox(
        &self,
        config: &PodSandboxConfig,
        runtime_handler: &str,
    ) -> Result<String>;

    /// Stop a sandbox (and its containers). Idempotent on stopped
    /// sandboxes. Sandbox removal is garbage collection's job, not the
    /// sync loop's, so it is not part of this facade.
    async fn stop_pod_sandbox(&self, id: &str) -> Result<()>;

    async fn pod_sandbox_status(&self, id: &str) -> Result<PodSandboxStatus>;

    /// List containers matching the filter (all when `None`).
    async fn list_containers(&self, filter: Option<&ContainerFilter>) -> Result<Vec<Container>>;

    async fn container_status(&self, id: &str) -> Result<ContainerStatus>;

    /// Create a container inside a sandbox; returns its id.
    async fn create_container(
        &self,
        sandbox_id: &str,
        config: &ContainerConfig,
        sandbox_config: &PodSandboxConfig,
    ) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stop a container, allowing `grace_seconds` before the runtime kills it.
    async fn stop_container(&self, id: &str, grace_seconds: i64) -> Result<()>;

    async fn remove_container(&self, id: &str) -> Result<()>;

    /// Push updated network configuration (pod CIDR) down to the runtime.
    async fn update_runtime_config(&self, network: &NetworkConfig) -> Result<()>;
}

/// The CRI image calls an image puller needs — and nothing else. Wired into
/// the puller at construction so it never holds a reconciler back-reference.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Pull an image; returns the image ref the runtime stored it under.
    async fn pull_image(&self, image: &str, auth: Option<&ImageAuth>) -> Result<String>;

    /// Resolve an image ref to its stored id, or `None` when absent.
    async fn image_status(&self, image: &str) -> Result<Option<String>>;

    async fn remove_image(&self, image: &str) -> Result<()>;
}

/// Registry credentials for one pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageAuth {
    pub username: String,
    pub password: String,
    /// Registry host this credential applies to.
    pub server: String,
}
