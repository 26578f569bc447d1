//! The sync executor: drives the runtime to execute a `PodActions` plan.
//!
//! Phase order within one cycle: kill plan → init pruning → sandbox create
//! → ephemeral starts → init start → main starts. Failure semantics differ
//! per phase: kills and init starts abort the cycle, main starts are
//! isolated from each other, ephemeral starts are logged and forgotten.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use pkg_cri::client::ImageAuth;
use pkg_cri::types::{
    ContainerConfig, ContainerMetadata, ContainerResources, ContainerState, EnvVar,
    PodSandboxConfig, PodSandboxMetadata,
};
use pkg_types::pod::{ContainerKind, ContainerSpec, Pod, ResourceRequirements};
use pkg_types::validate::validate_pod;

use crate::backoff::Backoff;
use crate::error::{PodSyncResult, SyncActionKind, SyncError, SyncResult};
use crate::events::{EventType, reasons};
use crate::hash::container_spec_hash;
use crate::inventory::RunningPod;
use crate::labels::{container_labels, restart_count_from_labels};
use crate::manager::RuntimeManager;
use crate::planner::compute_pod_actions;
use crate::status::{PodStatus, determine_pod_ips};

impl RuntimeManager {
    /// Run one sync cycle for `pod` against its observed `status`.
    ///
    /// The caller serializes cycles per pod UID; this method assumes it is
    /// the only sync running for this pod and takes no per-pod locks.
    pub async fn sync_pod(
        &self,
        pod: &Pod,
        status: &PodStatus,
        pull_secrets: &[ImageAuth],
        backoff: &Backoff,
    ) -> PodSyncResult {
        let mut result = PodSyncResult::default();

        if let Err(e) = validate_pod(pod) {
            result.add(SyncResult::fail(
                SyncActionKind::ConfigPodSandbox,
                &pod.name,
                SyncError::ConfigPodSandbox(e),
            ));
            return result;
        }

        let actions = compute_pod_actions(
            pod,
            status,
            self.liveness.as_ref(),
            self.internal_lifecycle.as_ref(),
            self.config.ephemeral_containers,
        );
        debug!("[pod:{}/{}] sync plan: {:?}", pod.namespace, pod.name, actions);

        if actions.kill_pod {
            let running = RunningPod::from_status(status);
            let kill_result = self
                .kill_pod_with_sync_result(Some(pod), &running, None)
                .await;
            result.extend(kill_result);
            if !result.succeeded() {
                error!(
                    "[pod:{}/{}] killing pod failed, aborting sync",
                    pod.namespace, pod.name
                );
                return result;
            }
        } else {
            for (container_id, kill) in &actions.containers_to_kill {
                match self
                    .kill_container(Some(pod), container_id, &kill.name, &kill.reason, None)
                    .await
                {
                    Ok(()) => result.add(SyncResult::ok(SyncActionKind::KillContainer, &kill.name)),
                    Err(e) => {
                        // Killed containers must actually be gone before any
                        // recreation, so a failed kill ends the cycle.
                        error!(
                            "[pod:{}/{}] failed to kill container {}: {}",
                            pod.namespace, pod.name, kill.name, e
                        );
                        result.add(SyncResult::fail(SyncActionKind::KillContainer, &kill.name, e));
                        return result;
                    }
                }
            }
        }

        self.prune_init_containers(pod, status).await;

        if !actions.create_sandbox
            && actions.next_init_container.is_none()
            && actions.containers_to_start.is_empty()
            && actions.ephemeral_containers_to_start.is_empty()
        {
            return result;
        }

        let mut sandbox_id = actions.sandbox_id.clone();
        let mut pod_ips = status.ips.clone();
        if actions.create_sandbox {
            let sandbox_config = self.generate_sandbox_config(pod, actions.attempt);
            info!(
                "[pod:{}/{}] creating sandbox, attempt {}",
                pod.namespace, pod.name, actions.attempt
            );
            match self
                .runtime
                .run_pod_sandbox(&sandbox_config, &self.runtime_handler(pod))
                .await
            {
                Ok(id) => {
                    result.add(SyncResult::ok(SyncActionKind::CreatePodSandbox, &id));
                    sandbox_id = id;
                }
                Err(e) => {
                    self.recorder.event(
                        pod,
                        EventType::Warning,
                        reasons::FAILED_CREATE_POD_SANDBOX,
                        format!("Failed to create pod sandbox: {e}"),
                    );
                    error!(
                        "[pod:{}/{}] failed to create sandbox: {}",
                        pod.namespace, pod.name, e
                    );
                    result.add(SyncResult::fail(
                        SyncActionKind::CreatePodSandbox,
                        &pod.name,
                        SyncError::CreatePodSandbox(e),
                    ));
                    return result;
                }
            }

            match self.runtime.pod_sandbox_status(&sandbox_id).await {
                Ok(sandbox_status) => {
                    if !pod.spec.host_network {
                        pod_ips = determine_pod_ips(&self.config.node_ips, &sandbox_status);
                    }
                }
                Err(e) => {
                    result.add(SyncResult::fail(
                        SyncActionKind::CreatePodSandbox,
                        &sandbox_id,
                        SyncError::CreatePodSandbox(e),
                    ));
                    return result;
                }
            }
        }

        let sandbox_config = self.generate_sandbox_config(pod, actions.attempt);
        let primary_ip = pod_ips.first().cloned().unwrap_or_default();

        for idx in &actions.ephemeral_containers_to_start {
            let container = &pod.spec.ephemeral_containers[*idx];
            match self
                .start_container(
                    pod,
                    container,
                    ContainerKind::Ephemeral,
                    &sandbox_id,
                    &sandbox_config,
                    &primary_ip,
                    status,
                    pull_secrets,
                    backoff,
                )
                .await
            {
                Ok(_) => result.add(SyncResult::ok(SyncActionKind::StartContainer, &container.name)),
                Err(e) => {
                    // Debug containers never fail the pod.
                    warn!(
                        "[pod:{}/{}] ephemeral container {} failed to start: {}",
                        pod.namespace, pod.name, container.name, e
                    );
                }
            }
        }

        if let Some(idx) = actions.next_init_container {
            let container = &pod.spec.init_containers[idx];
            match self
                .start_container(
                    pod,
                    container,
                    ContainerKind::Init,
                    &sandbox_id,
                    &sandbox_config,
                    &primary_ip,
                    status,
                    pull_secrets,
                    backoff,
                )
                .await
            {
                Ok(_) => {
                    info!(
                        "[pod:{}/{}] started init container {}",
                        pod.namespace, pod.name, container.name
                    );
                    result.add(SyncResult::ok(SyncActionKind::StartContainer, &container.name));
                }
                Err(e) => {
                    // Init is strictly ordered; nothing may start after a
                    // failed init container.
                    error!(
                        "[pod:{}/{}] failed to start init container {}: {}",
                        pod.namespace, pod.name, container.name, e
                    );
                    result.add(SyncResult::fail(
                        SyncActionKind::StartContainer,
                        &container.name,
                        e,
                    ));
                    return result;
                }
            }
        }

        for idx in &actions.containers_to_start {
            let container = &pod.spec.containers[*idx];
            let kind = if pod.is_sidecar(&container.name) {
                ContainerKind::Sidecar
            } else {
                ContainerKind::Main
            };
            match self
                .start_container(
                    pod,
                    container,
                    kind,
                    &sandbox_id,
                    &sandbox_config,
                    &primary_ip,
                    status,
                    pull_secrets,
                    backoff,
                )
                .await
            {
                Ok(_) => result.add(SyncResult::ok(SyncActionKind::StartContainer, &container.name)),
                Err(e) => {
                    // Mains are unordered; siblings still get their chance.
                    warn!(
                        "[pod:{}/{}] failed to start container {}: {}",
                        pod.namespace, pod.name, container.name, e
                    );
                    result.add(SyncResult::fail(
                        SyncActionKind::StartContainer,
                        &container.name,
                        e,
                    ));
                }
            }
        }

        result
    }

    /// Pull, create, start, and hook one container. Returns the new
    /// container id.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn start_container(
        &self,
        pod: &Pod,
        container: &ContainerSpec,
        kind: ContainerKind,
        sandbox_id: &str,
        sandbox_config: &PodSandboxConfig,
        pod_ip: &str,
        pod_status: &PodStatus,
        pull_secrets: &[ImageAuth],
        backoff: &Backoff,
    ) -> Result<String, SyncError> {
        let hash = container_spec_hash(container);
        let latest = pod_status.find_container(&container.name);

        // Back-off is referenced to the previous incarnation's finish time.
        if let Some(s) = latest
            && s.state == ContainerState::Exited
            && let Some(finished_at) = s.finished_at
        {
            let key = Backoff::key(&pod.uid, &container.name, &hash);
            if backoff.is_in_backoff_since(&key, finished_at) {
                self.recorder.event(
                    pod,
                    EventType::Warning,
                    reasons::BACK_OFF,
                    format!("Back-off restarting failed container {}", container.name),
                );
                return Err(SyncError::CrashLoopBackOff {
                    container: container.name.clone(),
                });
            }
            backoff.next(&key, finished_at);
        }

        let image_ref = self.puller.ensure_image(&container.image, pull_secrets).await?;
        self.recorder.event(
            pod,
            EventType::Normal,
            reasons::PULLED,
            format!("Container image {:?} ready", container.image),
        );

        let restart_count = latest
            .and_then(|s| restart_count_from_labels(&s.labels))
            .map(|count| count + 1)
            .unwrap_or(0);
        let config =
            self.generate_container_config(pod, container, kind, &image_ref, restart_count, pod_ip);

        let container_id = self
            .runtime
            .create_container(sandbox_id, &config, sandbox_config)
            .await
            .map_err(|e| {
                self.recorder.event(
                    pod,
                    EventType::Warning,
                    reasons::FAILED,
                    format!("Failed to create container {}: {}", container.name, e),
                );
                SyncError::StartContainer(e)
            })?;
        self.recorder.event(
            pod,
            EventType::Normal,
            reasons::CREATED,
            format!("Created container {}", container.name),
        );

        self.runtime
            .start_container(&container_id)
            .await
            .map_err(|e| {
                self.recorder.event(
                    pod,
                    EventType::Warning,
                    reasons::FAILED,
                    format!("Failed to start container {}: {}", container.name, e),
                );
                SyncError::StartContainer(e)
            })?;
        self.recorder.event(
            pod,
            EventType::Normal,
            reasons::STARTED,
            format!("Started container {}", container.name),
        );

        if !container.post_start_exec.is_empty()
            && let Err(e) = self.hooks.post_start(pod, container, &container_id).await
        {
            warn!(
                "[pod:{}/{}] post-start hook of {} failed: {}",
                pod.namespace, pod.name, container.name, e
            );
            // A container whose post-start hook failed must not keep
            // running.
            if let Err(stop_err) = self.runtime.stop_container(&container_id, 0).await {
                warn!(
                    "failed to stop container {} after post-start failure: {}",
                    container_id, stop_err
                );
            }
            return Err(SyncError::PostStartHook(e));
        }

        Ok(container_id)
    }

    /// Remove terminated init-container incarnations beyond the newest one
    /// per name. Best effort: failures are logged and retried next cycle.
    pub(crate) async fn prune_init_containers(&self, pod: &Pod, status: &PodStatus) {
        for container in &pod.spec.init_containers {
            let mut newest_kept = false;
            for s in status
                .container_statuses
                .iter()
                .filter(|s| s.metadata.name == container.name && s.state == ContainerState::Exited)
            {
                if !newest_kept {
                    newest_kept = true;
                    continue;
                }
                if let Err(e) = self.runtime.remove_container(&s.id).await {
                    debug!(
                        "[pod:{}/{}] pruning init container {} failed: {}",
                        pod.namespace, pod.name, s.id, e
                    );
                }
            }
        }
    }

    pub(crate) fn runtime_handler(&self, pod: &Pod) -> String {
        pod.spec
            .runtime_handler
            .clone()
            .unwrap_or_else(|| self.config.default_runtime_handler.clone())
    }

    pub(crate) fn generate_sandbox_config(&self, pod: &Pod, attempt: u32) -> PodSandboxConfig {
        let mut labels = pod.labels.clone();
        labels.insert(
            pkg_constants::labels::LABEL_POD_UID.to_string(),
            pod.uid.clone(),
        );
        labels.insert(
            pkg_constants::labels::LABEL_POD_NAME.to_string(),
            pod.name.clone(),
        );
        labels.insert(
            pkg_constants::labels::LABEL_POD_NAMESPACE.to_string(),
            pod.namespace.clone(),
        );
        PodSandboxConfig {
            metadata: PodSandboxMetadata {
                name: pod.name.clone(),
                namespace: pod.namespace.clone(),
                uid: pod.uid.clone(),
                attempt,
            },
            hostname: pod.name.clone(),
            log_directory: format!(
                "{}/{}_{}_{}",
                self.config.pod_log_dir, pod.namespace, pod.name, pod.uid
            ),
            host_network: pod.spec.host_network,
            labels,
            annotations: pod.annotations.clone(),
        }
    }

    pub(crate) fn generate_container_config(
        &self,
        pod: &Pod,
        container: &ContainerSpec,
        kind: ContainerKind,
        image_ref: &str,
        restart_count: u32,
        pod_ip: &str,
    ) -> ContainerConfig {
        let hash = container_spec_hash(container);

        let mut env_keys: Vec<&String> = container.env.keys().collect();
        env_keys.sort();
        let mut envs: Vec<EnvVar> = env_keys
            .into_iter()
            .map(|k| EnvVar {
                name: k.clone(),
                value: container.env[k].clone(),
            })
            .collect();
        if !pod_ip.is_empty() {
            envs.push(EnvVar {
                name: "POD_IP".to_string(),
                value: pod_ip.to_string(),
            });
        }

        let mut annotations = HashMap::new();
        if !self.config.seccomp_profile_root.is_empty() {
            annotations.insert(
                "podsync.dev/seccomp-profile".to_string(),
                format!("{}/default.json", self.config.seccomp_profile_root),
            );
        }

        ContainerConfig {
            metadata: ContainerMetadata {
                name: container.name.clone(),
                attempt: restart_count,
            },
            image: image_ref.to_string(),
            command: container.command.clone(),
            args: container.args.clone(),
            working_dir: container.working_dir.clone().unwrap_or_default(),
            envs,
            log_path: format!("{}/{}.log", container.name, restart_count),
            resources: Some(self.container_resources(&container.resources)),
            labels: container_labels(pod, container, kind, &hash, restart_count),
            annotations,
        }
    }

    fn container_resources(&self, requirements: &ResourceRequirements) -> ContainerResources {
        const MIN_SHARES: u64 = 2;
        const SHARES_PER_CPU: u64 = 1024;
        const MILLI_CPU_TO_CPU: u64 = 1000;
        const MIN_QUOTA_US: u64 = 1000;

        let cpu_shares = if requirements.cpu_millis == 0 {
            MIN_SHARES
        } else {
            ((requirements.cpu_millis * SHARES_PER_CPU) / MILLI_CPU_TO_CPU).max(MIN_SHARES)
        };
        let (cpu_period_us, cpu_quota_us) =
            if self.config.cpu_cfs_quota && requirements.cpu_millis > 0 {
                let period = self.config.cpu_cfs_quota_period_us;
                let quota = ((requirements.cpu_millis * period) / MILLI_CPU_TO_CPU).max(MIN_QUOTA_US);
                (period, quota as i64)
            } else {
                (0, 0)
            };

        ContainerResources {
            cpu_shares,
            cpu_period_us,
            cpu_quota_us,
            memory_limit_bytes: requirements.memory_bytes,
        }
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
