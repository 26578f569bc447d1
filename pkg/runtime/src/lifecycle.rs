//! Lifecycle hook collaborators.
//!
//! Two distinct seams: `HookRunner` executes the pod-authored pre-stop and
//! post-start commands inside the container (may block for its full
//! timeout); `InternalLifecycle` notifies in-process resource managers so
//! CPU/device allocations are released when a container stops running.

use anyhow::Result;
use async_trait::async_trait;
use pkg_types::pod::{ContainerSpec, Pod};

#[async_trait]
pub trait HookRunner: Send + Sync {
    /// Run the container's pre-stop command, bounded by the grace period.
    async fn pre_stop(
        &self,
        pod: &Pod,
        container: &ContainerSpec,
        container_id: &str,
        grace_seconds: i64,
    ) -> Result<()>;

    /// Run the container's post-start command.
    async fn post_start(&self, pod: &Pod, container: &ContainerSpec, container_id: &str)
    -> Result<()>;
}

/// In-process notifications for resource managers. Must be idempotent: the
/// planner fires `post_stop_container` every cycle a container is observed
/// non-running.
pub trait InternalLifecycle: Send + Sync {
    fn post_stop_container(&self, pod_uid: &str, container_name: &str);
}

/// No-op implementations for wiring without hooks.
pub struct NoopHooks;

#[async_trait]
impl HookRunner for NoopHooks {
    async fn pre_stop(
        &self,
        _pod: &Pod,
        _container: &ContainerSpec,
        _container_id: &str,
        _grace_seconds: i64,
    ) -> Result<()> {
        Ok(())
    }

    async fn post_start(
        &self,
        _pod: &Pod,
        _container: &ContainerSpec,
        _container_id: &str,
    ) -> Result<()> {
        Ok(())
    }
}

impl InternalLifecycle for NoopHooks {
    fn post_stop_container(&self, _pod_uid: &str, _container_name: &str) {}
}
