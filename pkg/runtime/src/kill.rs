//! The kill path: stopping containers with grace, then their sandboxes.

use tracing::{error, info, warn};

use pkg_types::pod::Pod;

use crate::error::{PodSyncResult, SyncActionKind, SyncError, SyncResult};
use crate::events::{EventType, reasons};
use crate::inventory::RunningPod;
use crate::manager::RuntimeManager;

impl RuntimeManager {
    /// Stop one container: pre-stop hook first (while grace remains), then
    /// the CRI stop with the effective grace period.
    ///
    /// A grace override ≥ 0 wins over the spec's grace; any positive grace
    /// is floored at 2 seconds so the container sees SIGTERM before
    /// SIGKILL.
    pub(crate) async fn kill_container(
        &self,
        pod: Option<&Pod>,
        container_id: &str,
        container_name: &str,
        reason: &str,
        grace_override: Option<i64>,
    ) -> Result<(), SyncError> {
        let container = pod.and_then(|p| p.find_container(container_name));
        let mut grace = pod
            .map(Pod::termination_grace)
            .unwrap_or(pkg_constants::runtime::DEFAULT_KILL_GRACE_SECONDS);

        if let (Some(p), Some(c)) = (pod, container)
            && !c.pre_stop_exec.is_empty()
            && grace > 0
            && let Err(e) = self.hooks.pre_stop(p, c, container_id, grace).await
        {
            // A failed pre-stop hook does not save the container.
            warn!(
                "[pod:{}/{}] pre-stop hook of {} failed: {}",
                p.namespace, p.name, container_name, e
            );
        }

        if let Some(override_grace) = grace_override
            && override_grace >= 0
        {
            grace = override_grace;
        }
        if grace > 0 && grace < pkg_constants::runtime::MIN_KILL_GRACE_SECONDS {
            grace = pkg_constants::runtime::MIN_KILL_GRACE_SECONDS;
        }

        if let Some(p) = pod {
            self.recorder.event(
                p,
                EventType::Normal,
                reasons::KILLING,
                format!("Stopping container {container_name}: {reason}"),
            );
        }
        info!(
            "killing container {} ({}) with {}s grace",
            container_id, reason, grace
        );
        self.runtime
            .stop_container(container_id, grace)
            .await
            .map_err(SyncError::KillContainer)
    }

    /// Stop every container of `running` (with grace and hooks), then every
    /// sandbox, accounting each operation on the returned result.
    ///
    /// `pod` may be absent when tearing down orphans discovered by the
    /// inventory; hooks and per-spec grace are skipped in that case.
    pub async fn kill_pod_with_sync_result(
        &self,
        pod: Option<&Pod>,
        running: &RunningPod,
        grace_override: Option<i64>,
    ) -> PodSyncResult {
        let mut result = PodSyncResult::default();

        for container in running.active_containers() {
            match self
                .kill_container(
                    pod,
                    &container.id,
                    &container.metadata.name,
                    "pod is being killed",
                    grace_override,
                )
                .await
            {
                Ok(()) => result.add(SyncResult::ok(
                    SyncActionKind::KillContainer,
                    &container.metadata.name,
                )),
                Err(e) => {
                    error!(
                        "[pod:{}/{}] failed to kill container {}: {}",
                        running.namespace, running.name, container.id, e
                    );
                    result.add(SyncResult::fail(
                        SyncActionKind::KillContainer,
                        &container.metadata.name,
                        e,
                    ));
                }
            }
        }

        // Sandboxes go down even when a container stop failed; the next
        // cycle observes whatever is left and re-plans.
        for sandbox in &running.sandboxes {
            match self.runtime.stop_pod_sandbox(&sandbox.id).await {
                Ok(()) => result.add(SyncResult::ok(SyncActionKind::KillPodSandbox, &sandbox.id)),
                Err(e) => {
                    error!(
                        "[pod:{}/{}] failed to stop sandbox {}: {}",
                        running.namespace, running.name, sandbox.id, e
                    );
                    result.add(SyncResult::fail(
                        SyncActionKind::KillPodSandbox,
                        &sandbox.id,
                        SyncError::KillPodSandbox(e),
                    ));
                }
            }
        }

        result
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
