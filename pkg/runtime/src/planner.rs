//! The action planner: `(desired spec, observed status) → PodActions`.
//!
//! Pure and deterministic — identical inputs yield identical plans. The
//! planner decides; the sync executor acts. The only outward call is the
//! idempotent `post_stop_container` notification for containers observed
//! non-running, which releases CPU/device allocations but never changes the
//! produced plan.

use std::collections::HashMap;

use tracing::debug;

use pkg_cri::types::{ContainerState, ContainerStatus, NamespaceMode, SandboxState};
use pkg_types::pod::{ContainerSpec, Pod, RestartPolicy};

use crate::hash::container_spec_hash;
use crate::labels::container_hash_from_labels;
use crate::lifecycle::InternalLifecycle;
use crate::probe::{LivenessManager, ProbeResult};
use crate::status::PodStatus;

// Kill reasons carried on `ContainerToKill` entries.
pub const REASON_DEFINITION_CHANGED: &str = "definition changed";
pub const REASON_LIVENESS_FAILED: &str = "failed liveness probe";
pub const REASON_MAINS_FINISHED: &str = "main containers all finished";
pub const REASON_UNKNOWN_STATE: &str = "Container in Unknown state, try killing before restart";
pub const REASON_INIT_UNKNOWN_STATE: &str =
    "Init container is in Unknown state, try killing it before restart";

/// One container the executor must stop this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerToKill {
    pub name: String,
    /// Index into the main container list; `None` for init containers.
    pub main_index: Option<usize>,
    pub reason: String,
}

/// The plan for one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodActions {
    /// Stop all sandboxes for this pod after handling containers.
    pub kill_pod: bool,
    /// Create a fresh sandbox before starting any container.
    pub create_sandbox: bool,
    /// Existing sandbox to reuse; empty when creating fresh.
    pub sandbox_id: String,
    /// Attempt number for the (new) sandbox.
    pub attempt: u32,
    /// At most one init container to start this cycle.
    pub next_init_container: Option<usize>,
    /// Indices into the main container list to start.
    pub containers_to_start: Vec<usize>,
    /// Indices into the ephemeral container list to start.
    pub ephemeral_containers_to_start: Vec<usize>,
    /// Container id → kill directive.
    pub containers_to_kill: HashMap<String, ContainerToKill>,
}

impl PodActions {
    /// True when the plan performs no operation at all — the converged
    /// steady state.
    pub fn is_noop(&self) -> bool {
        !self.kill_pod
            && !self.create_sandbox
            && self.next_init_container.is_none()
            && self.containers_to_start.is_empty()
            && self.ephemeral_containers_to_start.is_empty()
            && self.containers_to_kill.is_empty()
    }
}

/// Whether the pod needs a fresh sandbox, and the attempt number / reusable
/// sandbox id that goes with the answer.
fn pod_sandbox_changed(pod: &Pod, status: &PodStatus) -> (bool, u32, String) {
    let Some(newest) = status.newest_sandbox() else {
        return (true, 0, String::new());
    };

    let ready_count = status
        .sandbox_statuses
        .iter()
        .filter(|s| s.state == SandboxState::Ready)
        .count();
    if ready_count > 1 {
        debug!(
            "[pod:{}/{}] has {} ready sandboxes, reconciling the excess",
            pod.namespace, pod.name, ready_count
        );
        return (true, newest.metadata.attempt + 1, String::new());
    }
    if newest.state != SandboxState::Ready {
        return (true, newest.metadata.attempt + 1, String::new());
    }
    let sandbox_host_network = newest.network.namespace_mode == NamespaceMode::Node;
    if sandbox_host_network != pod.spec.host_network {
        debug!(
            "[pod:{}/{}] network namespace mode changed, recreating sandbox",
            pod.namespace, pod.name
        );
        return (true, newest.metadata.attempt + 1, String::new());
    }
    if !pod.spec.host_network && newest.network.ips.is_empty() {
        debug!(
            "[pod:{}/{}] sandbox has no IP, recreating",
            pod.namespace, pod.name
        );
        return (true, newest.metadata.attempt + 1, String::new());
    }
    (false, newest.metadata.attempt, newest.id.clone())
}

#[derive(Debug, Clone, Copy)]
struct MainContainerFlags {
    /// Every non-sidecar main container has exited.
    all_main_exited: bool,
    /// Every non-sidecar main container exited with code 0.
    all_main_succeeded: bool,
    /// Every container in the main list (sidecars included) has exited.
    all_exited: bool,
    /// Some sidecar is still created or running.
    has_sidecar_in_progress: bool,
}

fn main_container_flags(pod: &Pod, status: &PodStatus) -> MainContainerFlags {
    let mut flags = MainContainerFlags {
        all_main_exited: true,
        all_main_succeeded: true,
        all_exited: true,
        has_sidecar_in_progress: false,
    };
    for container in &pod.spec.containers {
        let container_status = status.find_container(&container.name);
        let state = container_status.map(|s| s.state);
        let exited = state == Some(ContainerState::Exited);
        if !exited {
            flags.all_exited = false;
        }
        if pod.is_sidecar(&container.name) {
            if matches!(
                state,
                Some(ContainerState::Running | ContainerState::Created)
            ) {
                flags.has_sidecar_in_progress = true;
            }
        } else if !exited {
            flags.all_main_exited = false;
            flags.all_main_succeeded = false;
        } else if container_status.map(|s| s.exit_code != 0).unwrap_or(true) {
            flags.all_main_succeeded = false;
        }
    }
    flags
}

/// "Main containers all finished" under the pod's restart policy; only
/// meaningful for one-off pods.
fn main_containers_finished(policy: RestartPolicy, flags: &MainContainerFlags) -> bool {
    match policy {
        RestartPolicy::Always => false,
        RestartPolicy::OnFailure => flags.all_main_succeeded,
        RestartPolicy::Never => flags.all_main_exited,
    }
}

/// The generic restart predicate: running containers stay, exited ones
/// restart per policy, never-started and unknown ones start.
fn should_restart_generic(policy: RestartPolicy, status: Option<&ContainerStatus>) -> bool {
    let Some(status) = status else {
        return true;
    };
    match status.state {
        ContainerState::Running => false,
        ContainerState::Unknown => true,
        // Created but never started: it has not run yet, so the restart
        // policy (which governs re-starts) does not suppress it.
        ContainerState::Created => true,
        ContainerState::Exited => match policy {
            RestartPolicy::Always => true,
            RestartPolicy::OnFailure => status.exit_code != 0,
            RestartPolicy::Never => false,
        },
    }
}

/// The restart predicate with one-off sidecar coordination layered on top:
/// sidecar restarts track the lifetime of the true main containers, not
/// their own exit codes.
fn should_restart(
    pod: &Pod,
    sidecar: bool,
    status: Option<&ContainerStatus>,
    main_finished: bool,
) -> bool {
    let policy = pod.spec.restart_policy;
    if !pod.is_one_off() {
        return should_restart_generic(policy, status);
    }
    match status {
        None => !(sidecar && main_finished),
        Some(s) if sidecar && s.state == ContainerState::Running => false,
        Some(_) if sidecar => !main_finished,
        Some(_) => should_restart_generic(policy, status),
    }
}

fn is_init_failed(status: &ContainerStatus) -> bool {
    status.state == ContainerState::Exited && status.exit_code != 0
}

/// Walk the init list in order. Returns the last observed status of the
/// container under consideration, the index of the next init container to
/// start (none while one is still running), and whether init is done.
fn find_next_init<'a>(
    pod: &Pod,
    status: &'a PodStatus,
) -> (Option<&'a ContainerStatus>, Option<usize>, bool) {
    for (idx, container) in pod.spec.init_containers.iter().enumerate() {
        match status.find_container(&container.name) {
            Some(s) if s.state == ContainerState::Exited && s.exit_code == 0 => continue,
            Some(s) if s.state == ContainerState::Running => return (Some(s), None, false),
            s => return (s, Some(idx), false),
        }
    }
    (None, None, true)
}

fn container_succeeded(container: &ContainerSpec, status: &PodStatus) -> bool {
    status
        .find_container(&container.name)
        .map(|s| s.state == ContainerState::Exited && s.exit_code == 0)
        .unwrap_or(false)
}

/// Compute the plan for one sync cycle.
pub fn compute_pod_actions(
    pod: &Pod,
    status: &PodStatus,
    liveness: &dyn LivenessManager,
    lifecycle: &dyn InternalLifecycle,
    ephemeral_containers_enabled: bool,
) -> PodActions {
    let (sandbox_changed, attempt, sandbox_id) = pod_sandbox_changed(pod, status);
    let one_off = pod.is_one_off();
    let policy = pod.spec.restart_policy;
    let flags = main_container_flags(pod, status);

    let nothing_observed =
        status.sandbox_statuses.is_empty() && status.container_statuses.is_empty();
    let mut actions = PodActions {
        kill_pod: sandbox_changed && !nothing_observed,
        create_sandbox: sandbox_changed,
        sandbox_id,
        attempt,
        ..Default::default()
    };

    if sandbox_changed {
        // One-off pods whose workload already ran to completion never get a
        // fresh sandbox: teardown is the only remaining work. This closes
        // the race between sidecar teardown and sandbox destruction.
        if one_off && flags.all_main_exited {
            return PodActions {
                kill_pod: true,
                create_sandbox: false,
                attempt,
                ..Default::default()
            };
        }
        // A Never pod that already ran in a prior attempt is terminal.
        if policy == RestartPolicy::Never
            && attempt != 0
            && !status.container_statuses.is_empty()
        {
            actions.create_sandbox = false;
            return actions;
        }
        if !pod.spec.init_containers.is_empty() {
            actions.next_init_container = Some(0);
            return actions;
        }
        for (idx, container) in pod.spec.containers.iter().enumerate() {
            if policy == RestartPolicy::OnFailure && container_succeeded(container, status) {
                continue;
            }
            actions.containers_to_start.push(idx);
        }
        return actions;
    }

    // Ephemeral containers are inserted, never restarted.
    if ephemeral_containers_enabled {
        for (idx, container) in pod.spec.ephemeral_containers.iter().enumerate() {
            if status.find_container(&container.name).is_none() {
                actions.ephemeral_containers_to_start.push(idx);
            }
        }
    }

    // Init progression: strictly ordered, mains untouched until done.
    let (init_last_status, next_init, init_done) = find_next_init(pod, status);
    if !init_done {
        if let Some(next_idx) = next_init {
            let init_failed = init_last_status.map(is_init_failed).unwrap_or(false);
            if init_failed && policy == RestartPolicy::Never {
                actions.kill_pod = true;
            } else {
                if let Some(s) = init_last_status
                    && s.state == ContainerState::Unknown
                {
                    actions.containers_to_kill.insert(
                        s.id.clone(),
                        ContainerToKill {
                            name: pod.spec.init_containers[next_idx].name.clone(),
                            main_index: None,
                            reason: REASON_INIT_UNKNOWN_STATE.to_string(),
                        },
                    );
                }
                actions.next_init_container = Some(next_idx);
            }
        }
        return actions;
    }

    let main_finished = main_containers_finished(policy, &flags);
    let mut keep_count = 0usize;
    for (idx, container) in pod.spec.containers.iter().enumerate() {
        let container_status = status.find_container(&container.name);
        let sidecar = pod.is_sidecar(&container.name);

        let Some(s) = container_status else {
            if should_restart(pod, sidecar, None, main_finished) {
                actions.containers_to_start.push(idx);
            }
            continue;
        };

        if s.state != ContainerState::Running {
            // Release CPU/device allocations held for the dead container.
            lifecycle.post_stop_container(&pod.uid, &container.name);
            if should_restart(pod, sidecar, Some(s), main_finished) {
                actions.containers_to_start.push(idx);
                if s.state == ContainerState::Unknown {
                    actions.containers_to_kill.insert(
                        s.id.clone(),
                        ContainerToKill {
                            name: container.name.clone(),
                            main_index: Some(idx),
                            reason: REASON_UNKNOWN_STATE.to_string(),
                        },
                    );
                }
            }
            continue;
        }

        // Running: decide whether it may keep running.
        let current_hash = container_spec_hash(container);
        let (reason, restart) = if container_hash_from_labels(&s.labels)
            != Some(current_hash.as_str())
        {
            (REASON_DEFINITION_CHANGED, true)
        } else if matches!(liveness.result(&s.id), Some(ProbeResult::Failure)) {
            (REASON_LIVENESS_FAILED, policy != RestartPolicy::Never)
        } else if one_off && sidecar && main_finished {
            (REASON_MAINS_FINISHED, false)
        } else {
            keep_count += 1;
            continue;
        };
        debug!(
            "[pod:{}/{}] killing container {} ({}), restart={}",
            pod.namespace, pod.name, container.name, reason, restart
        );
        actions.containers_to_kill.insert(
            s.id.clone(),
            ContainerToKill {
                name: container.name.clone(),
                main_index: Some(idx),
                reason: reason.to_string(),
            },
        );
        if restart {
            actions.containers_to_start.push(idx);
        }
    }

    if !one_off {
        if keep_count == 0 && actions.containers_to_start.is_empty() {
            actions.kill_pod = true;
        }
    } else if !actions.create_sandbox {
        if flags.all_exited {
            if keep_count == 0 && actions.containers_to_start.is_empty() {
                actions.kill_pod = true;
            }
        } else if main_finished && !flags.has_sidecar_in_progress {
            actions.kill_pod = true;
        }
    }
    actions
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::NoopHooks;
    use crate::probe::NoProbes;
    use crate::testutil::{
        FakeHooks, FakeLiveness, exited_status, one_off_pod, pod_status_with, ready_sandbox,
        running_status, sandbox_status, simple_container, simple_pod, unknown_status,
    };
    use pkg_cri::types::NamespaceMode;

    fn plan(pod: &Pod, status: &PodStatus) -> PodActions {
        compute_pod_actions(pod, status, &NoProbes, &NoopHooks, false)
    }

    fn plan_with_liveness(pod: &Pod, status: &PodStatus, liveness: &FakeLiveness) -> PodActions {
        compute_pod_actions(pod, status, liveness, &NoopHooks, false)
    }

    // S1 — new pod, no sandbox.
    #[test]
    fn test_new_pod_creates_sandbox_and_starts_all() {
        let pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        let status = PodStatus::new("u1", "web", "default");

        let actions = plan(&pod, &status);
        assert!(!actions.kill_pod);
        assert!(actions.create_sandbox);
        assert_eq!(actions.attempt, 0);
        assert_eq!(actions.containers_to_start, vec![0]);
        assert!(actions.containers_to_kill.is_empty());
        assert!(actions.next_init_container.is_none());
    }

    // S2 — spec drift.
    #[test]
    fn test_spec_drift_kills_and_restarts() {
        let pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        let mut running = running_status("c1", &pod, "c");
        running.labels.insert(
            pkg_constants::labels::LABEL_CONTAINER_HASH.to_string(),
            "stalehash00000000".to_string(),
        );
        let status = pod_status_with(&pod, vec![ready_sandbox("sb1", &pod, 0)], vec![running]);

        let actions = plan(&pod, &status);
        assert!(!actions.kill_pod);
        assert!(!actions.create_sandbox);
        assert_eq!(actions.containers_to_start, vec![0]);
        let kill = &actions.containers_to_kill["c1"];
        assert_eq!(kill.reason, REASON_DEFINITION_CHANGED);
        assert_eq!(kill.name, "c");
    }

    // S3 — liveness failure.
    #[test]
    fn test_liveness_failure_restarts_per_policy() {
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.restart_policy = RestartPolicy::OnFailure;
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![running_status("c1", &pod, "c")],
        );

        let liveness = FakeLiveness::new();
        liveness.set("c1", ProbeResult::Failure);
        let actions = plan_with_liveness(&pod, &status, &liveness);
        assert_eq!(
            actions.containers_to_kill["c1"].reason,
            REASON_LIVENESS_FAILED
        );
        assert_eq!(actions.containers_to_start, vec![0]);
    }

    #[test]
    fn test_liveness_failure_never_policy_kills_without_restart() {
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.restart_policy = RestartPolicy::Never;
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![running_status("c1", &pod, "c")],
        );

        let liveness = FakeLiveness::new();
        liveness.set("c1", ProbeResult::Failure);
        let actions = plan_with_liveness(&pod, &status, &liveness);
        assert!(actions.containers_to_kill.contains_key("c1"));
        assert!(actions.containers_to_start.is_empty());
    }

    #[test]
    fn test_liveness_absent_is_a_pass() {
        let pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![running_status("c1", &pod, "c")],
        );
        let actions = plan(&pod, &status);
        assert!(actions.is_noop());
    }

    // S4 — one-off Never, main exited 0, two sidecars running.
    #[test]
    fn test_one_off_sidecars_killed_after_mains_finish() {
        let pod = one_off_pod(
            "u1",
            "batch",
            &[
                simple_container("main", "worker:latest"),
                simple_container("s1", "proxy:latest"),
                simple_container("s2", "logger:latest"),
            ],
            &["s1", "s2"],
            RestartPolicy::Never,
        );
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![
                exited_status("c-main", &pod, "main", 0),
                running_status("c-s1", &pod, "s1"),
                running_status("c-s2", &pod, "s2"),
            ],
        );

        let actions = plan(&pod, &status);
        assert!(!actions.kill_pod);
        assert!(!actions.create_sandbox);
        assert_eq!(actions.containers_to_kill.len(), 2);
        for id in ["c-s1", "c-s2"] {
            assert_eq!(actions.containers_to_kill[id].reason, REASON_MAINS_FINISHED);
        }
        assert!(actions.containers_to_start.is_empty());
    }

    #[test]
    fn test_one_off_kill_pod_once_sidecars_exit() {
        let pod = one_off_pod(
            "u1",
            "batch",
            &[
                simple_container("main", "worker:latest"),
                simple_container("s1", "proxy:latest"),
                simple_container("s2", "logger:latest"),
            ],
            &["s1", "s2"],
            RestartPolicy::Never,
        );
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![
                exited_status("c-main", &pod, "main", 0),
                exited_status("c-s1", &pod, "s1", 0),
                exited_status("c-s2", &pod, "s2", 137),
            ],
        );

        let actions = plan(&pod, &status);
        assert!(actions.kill_pod);
        assert!(!actions.create_sandbox);
        assert!(actions.containers_to_start.is_empty());
        assert!(actions.containers_to_kill.is_empty());
    }

    // S5 — one-off terminal shortcut.
    #[test]
    fn test_one_off_terminal_shortcut_skips_sandbox_recreation() {
        let pod = one_off_pod(
            "u1",
            "batch",
            &[simple_container("main", "worker:latest")],
            &[],
            RestartPolicy::OnFailure,
        );
        let status = pod_status_with(
            &pod,
            vec![sandbox_status(
                "sb1",
                &pod,
                0,
                SandboxState::NotReady,
                NamespaceMode::Pod,
                &[],
            )],
            vec![exited_status("c-main", &pod, "main", 0)],
        );

        let actions = plan(&pod, &status);
        assert!(actions.kill_pod);
        assert!(!actions.create_sandbox);
        assert!(actions.containers_to_start.is_empty());
        assert!(actions.containers_to_kill.is_empty());
        assert!(actions.next_init_container.is_none());
    }

    // S6 — init failure under Never.
    #[test]
    fn test_init_failure_never_kills_pod() {
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.init_containers = vec![simple_container("setup", "busybox:latest")];
        pod.spec.restart_policy = RestartPolicy::Never;
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![exited_status("c-init", &pod, "setup", 1)],
        );

        let actions = plan(&pod, &status);
        assert!(actions.kill_pod);
        assert!(actions.containers_to_start.is_empty());
        assert!(actions.containers_to_kill.is_empty());
        assert!(actions.next_init_container.is_none());
    }

    #[test]
    fn test_init_failure_on_failure_retries() {
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.init_containers = vec![simple_container("setup", "busybox:latest")];
        pod.spec.restart_policy = RestartPolicy::OnFailure;
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![exited_status("c-init", &pod, "setup", 1)],
        );

        let actions = plan(&pod, &status);
        assert!(!actions.kill_pod);
        assert_eq!(actions.next_init_container, Some(0));
        assert!(actions.containers_to_start.is_empty());
    }

    #[test]
    fn test_init_progression_is_ordered() {
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.init_containers = vec![
            simple_container("init-a", "busybox:latest"),
            simple_container("init-b", "busybox:latest"),
        ];
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![exited_status("c-a", &pod, "init-a", 0)],
        );

        let actions = plan(&pod, &status);
        assert_eq!(actions.next_init_container, Some(1));
        // Mains are not inspected while init is incomplete.
        assert!(actions.containers_to_start.is_empty());
    }

    #[test]
    fn test_running_init_container_waits() {
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.init_containers = vec![simple_container("setup", "busybox:latest")];
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![running_status("c-init", &pod, "setup")],
        );

        let actions = plan(&pod, &status);
        assert!(actions.is_noop());
    }

    #[test]
    fn test_unknown_init_container_killed_before_restart() {
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.init_containers = vec![simple_container("setup", "busybox:latest")];
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![unknown_status("c-init", &pod, "setup")],
        );

        let actions = plan(&pod, &status);
        assert_eq!(actions.next_init_container, Some(0));
        assert_eq!(
            actions.containers_to_kill["c-init"].reason,
            REASON_INIT_UNKNOWN_STATE
        );
    }

    #[test]
    fn test_all_init_done_starts_mains() {
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.init_containers = vec![simple_container("setup", "busybox:latest")];
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![exited_status("c-init", &pod, "setup", 0)],
        );

        let actions = plan(&pod, &status);
        assert!(actions.next_init_container.is_none());
        assert_eq!(actions.containers_to_start, vec![0]);
    }

    #[test]
    fn test_unknown_main_container_killed_and_restarted() {
        let pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![unknown_status("c1", &pod, "c")],
        );

        let actions = plan(&pod, &status);
        assert_eq!(actions.containers_to_start, vec![0]);
        assert_eq!(actions.containers_to_kill["c1"].reason, REASON_UNKNOWN_STATE);
    }

    #[test]
    fn test_exited_containers_restart_per_policy() {
        for (policy, exit_code, expect_restart) in [
            (RestartPolicy::Always, 0, true),
            (RestartPolicy::Always, 1, true),
            (RestartPolicy::OnFailure, 0, false),
            (RestartPolicy::OnFailure, 1, true),
            (RestartPolicy::Never, 0, false),
            (RestartPolicy::Never, 1, false),
        ] {
            let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
            pod.spec.restart_policy = policy;
            let status = pod_status_with(
                &pod,
                vec![ready_sandbox("sb1", &pod, 0)],
                vec![exited_status("c1", &pod, "c", exit_code)],
            );

            let actions = plan(&pod, &status);
            assert_eq!(
                actions.containers_to_start == vec![0],
                expect_restart,
                "policy {policy:?} exit {exit_code}"
            );
        }
    }

    #[test]
    fn test_multiple_ready_sandboxes_trigger_reconcile() {
        let pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        let status = pod_status_with(
            &pod,
            vec![
                ready_sandbox("sb-new", &pod, 1),
                ready_sandbox("sb-old", &pod, 0),
            ],
            vec![],
        );

        let actions = plan(&pod, &status);
        assert!(actions.create_sandbox);
        assert!(actions.kill_pod);
        assert_eq!(actions.attempt, 2);
    }

    #[test]
    fn test_network_mode_drift_recreates_sandbox() {
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.host_network = true;
        let status = pod_status_with(&pod, vec![ready_sandbox("sb1", &pod, 0)], vec![]);

        let actions = plan(&pod, &status);
        assert!(actions.create_sandbox);
        assert_eq!(actions.attempt, 1);
    }

    #[test]
    fn test_missing_sandbox_ip_recreates_sandbox() {
        let pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        let status = pod_status_with(
            &pod,
            vec![sandbox_status(
                "sb1",
                &pod,
                0,
                SandboxState::Ready,
                NamespaceMode::Pod,
                &[],
            )],
            vec![],
        );

        let actions = plan(&pod, &status);
        assert!(actions.create_sandbox);
        assert!(actions.kill_pod);
    }

    #[test]
    fn test_never_pod_with_history_is_not_recreated() {
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.restart_policy = RestartPolicy::Never;
        let status = pod_status_with(
            &pod,
            vec![sandbox_status(
                "sb1",
                &pod,
                1,
                SandboxState::NotReady,
                NamespaceMode::Pod,
                &[],
            )],
            vec![exited_status("c1", &pod, "c", 0)],
        );

        let actions = plan(&pod, &status);
        assert!(!actions.create_sandbox);
        assert!(actions.containers_to_start.is_empty());
        assert!(actions.next_init_container.is_none());
    }

    #[test]
    fn test_on_failure_recreation_skips_succeeded_containers() {
        let mut pod = simple_pod(
            "u1",
            "web",
            &[
                simple_container("done", "job:latest"),
                simple_container("retry", "job:latest"),
            ],
        );
        pod.spec.restart_policy = RestartPolicy::OnFailure;
        let status = pod_status_with(
            &pod,
            vec![sandbox_status(
                "sb1",
                &pod,
                0,
                SandboxState::NotReady,
                NamespaceMode::Pod,
                &[],
            )],
            vec![
                exited_status("c-done", &pod, "done", 0),
                exited_status("c-retry", &pod, "retry", 2),
            ],
        );

        let actions = plan(&pod, &status);
        assert!(actions.create_sandbox);
        assert_eq!(actions.containers_to_start, vec![1]);
    }

    #[test]
    fn test_ephemeral_containers_behind_feature_gate() {
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.ephemeral_containers = vec![simple_container("debugger", "busybox:latest")];
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![running_status("c1", &pod, "c")],
        );

        let gated = compute_pod_actions(&pod, &status, &NoProbes, &NoopHooks, false);
        assert!(gated.ephemeral_containers_to_start.is_empty());

        let enabled = compute_pod_actions(&pod, &status, &NoProbes, &NoopHooks, true);
        assert_eq!(enabled.ephemeral_containers_to_start, vec![0]);
    }

    #[test]
    fn test_ephemeral_containers_never_restart() {
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.ephemeral_containers = vec![simple_container("debugger", "busybox:latest")];
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![
                running_status("c1", &pod, "c"),
                exited_status("c-dbg", &pod, "debugger", 1),
            ],
        );

        let actions = compute_pod_actions(&pod, &status, &NoProbes, &NoopHooks, true);
        assert!(actions.ephemeral_containers_to_start.is_empty());
    }

    #[test]
    fn test_one_off_sidecar_missing_status_not_started_after_mains_finish() {
        let pod = one_off_pod(
            "u1",
            "batch",
            &[
                simple_container("main", "worker:latest"),
                simple_container("side", "proxy:latest"),
            ],
            &["side"],
            RestartPolicy::Never,
        );
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![exited_status("c-main", &pod, "main", 0)],
        );

        let actions = plan(&pod, &status);
        assert!(actions.containers_to_start.is_empty());
        // No sidecar ever ran, mains are done, nothing in progress: kill.
        assert!(actions.kill_pod);
    }

    #[test]
    fn test_empty_pod_with_ready_sandbox_is_killed() {
        let pod = simple_pod("u1", "empty", &[]);
        let status = pod_status_with(&pod, vec![ready_sandbox("sb1", &pod, 0)], vec![]);

        let actions = plan(&pod, &status);
        assert!(actions.kill_pod);
        assert!(!actions.create_sandbox);
    }

    #[test]
    fn test_non_running_containers_release_allocations() {
        let hooks = FakeHooks::new();
        let mut pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        pod.spec.restart_policy = RestartPolicy::Never;
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![exited_status("c1", &pod, "c", 0)],
        );

        compute_pod_actions(&pod, &status, &NoProbes, &hooks, false);
        assert_eq!(hooks.post_stop_calls(), vec!["c".to_string()]);
    }

    #[test]
    fn test_planner_is_deterministic() {
        let pod = one_off_pod(
            "u1",
            "batch",
            &[
                simple_container("main", "worker:latest"),
                simple_container("side", "proxy:latest"),
            ],
            &["side"],
            RestartPolicy::OnFailure,
        );
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![
                exited_status("c-main", &pod, "main", 0),
                running_status("c-side", &pod, "side"),
            ],
        );

        let first = plan(&pod, &status);
        let second = plan(&pod, &status);
        assert_eq!(first, second);
    }

    #[test]
    fn test_converged_state_plans_noop() {
        let pod = simple_pod(
            "u1",
            "web",
            &[
                simple_container("a", "nginx:latest"),
                simple_container("b", "redis:latest"),
            ],
        );
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![
                running_status("c-a", &pod, "a"),
                running_status("c-b", &pod, "b"),
            ],
        );

        assert!(plan(&pod, &status).is_noop());
    }

    #[test]
    fn test_kept_containers_match_recorded_hash() {
        // Invariant: a running container kept across a sync has a recorded
        // hash equal to its spec hash — anything else is killed.
        let pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        let status = pod_status_with(
            &pod,
            vec![ready_sandbox("sb1", &pod, 0)],
            vec![running_status("c1", &pod, "c")],
        );
        let actions = plan(&pod, &status);
        assert!(actions.containers_to_kill.is_empty());
        assert_eq!(
            crate::labels::container_hash_from_labels(&status.container_statuses[0].labels),
            Some(crate::hash::container_spec_hash(&pod.spec.containers[0]).as_str())
        );
    }

    #[test]
    fn test_kill_and_start_overlap_only_for_drift_liveness_or_unknown() {
        // Hash drift: overlap allowed.
        let pod = simple_pod("u1", "web", &[simple_container("c", "nginx:latest")]);
        let mut drifted = running_status("c1", &pod, "c");
        drifted.labels.insert(
            pkg_constants::labels::LABEL_CONTAINER_HASH.to_string(),
            "stale".to_string(),
        );
        let status = pod_status_with(&pod, vec![ready_sandbox("sb1", &pod, 0)], vec![drifted]);
        let actions = plan(&pod, &status);
        for (id, kill) in &actions.containers_to_kill {
            let overlaps = kill
                .main_index
                .is_some_and(|i| actions.containers_to_start.contains(&i));
            if overlaps {
                assert!(
                    kill.reason == REASON_DEFINITION_CHANGED
                        || kill.reason == REASON_LIVENESS_FAILED
                        || kill.reason == REASON_UNKNOWN_STATE,
                    "unexpected overlap for {id}: {}",
                    kill.reason
                );
            }
        }
    }
}
