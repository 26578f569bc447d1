//! Shared test fixtures: a DashMap-backed fake runtime and pod builders.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use pkg_cri::client::{ImageAuth, RuntimeService};
use pkg_cri::types::{
    Container, ContainerConfig, ContainerFilter, ContainerState, ContainerStatus, NamespaceMode,
    NetworkConfig, PodSandbox, PodSandboxConfig, PodSandboxFilter, PodSandboxStatus,
    RuntimeCondition, RuntimeStatus, SandboxNetworkStatus, SandboxState, VersionInfo,
    CONDITION_NETWORK_READY, CONDITION_RUNTIME_READY,
};
use pkg_types::pod::{
    ContainerKind, ContainerSpec, Pod, PodSpec, ResourceRequirements, RestartPolicy,
};

use crate::config::RuntimeConfig;
use crate::error::SyncError;
use crate::events::{EventRecorder, EventType};
use crate::hash::container_spec_hash;
use crate::labels::container_labels;
use crate::lifecycle::{HookRunner, InternalLifecycle};
use crate::manager::RuntimeManager;
use crate::probe::{LivenessManager, ProbeResult};
use crate::puller::ImagePuller;
use crate::status::{PodStatus, determine_pod_ips};

// ─── Builders ──────────────────────────────────────────────────────────────

pub(crate) fn simple_container(name: &str, image: &str) -> ContainerSpec {
    ContainerSpec {
        name: name.to_string(),
        image: image.to_string(),
        command: vec![],
        args: vec![],
        env: HashMap::new(),
        working_dir: None,
        resources: ResourceRequirements::default(),
        liveness_probe: None,
        pre_stop_exec: vec![],
        post_start_exec: vec![],
    }
}

pub(crate) fn simple_pod(uid: &str, name: &str, containers: &[ContainerSpec]) -> Pod {
    Pod {
        uid: uid.to_string(),
        name: name.to_string(),
        namespace: "default".to_string(),
        spec: PodSpec {
            init_containers: vec![],
            containers: containers.to_vec(),
            ephemeral_containers: vec![],
            restart_policy: RestartPolicy::Always,
            host_network: false,
            runtime_handler: None,
            termination_grace_period_seconds: None,
        },
        labels: HashMap::new(),
        annotations: HashMap::new(),
        created_at: Utc::now(),
    }
}

pub(crate) fn one_off_pod(
    uid: &str,
    name: &str,
    containers: &[ContainerSpec],
    sidecars: &[&str],
    policy: RestartPolicy,
) -> Pod {
    let mut pod = simple_pod(uid, name, containers);
    pod.spec.restart_policy = policy;
    pod.annotations.insert(
        pkg_constants::labels::ANNOTATION_ONE_OFF.to_string(),
        "true".to_string(),
    );
    if !sidecars.is_empty() {
        pod.annotations.insert(
            pkg_constants::labels::ANNOTATION_SIDECARS.to_string(),
            sidecars.join(","),
        );
    }
    pod
}

pub(crate) fn sandbox_status(
    id: &str,
    pod: &Pod,
    attempt: u32,
    state: SandboxState,
    mode: NamespaceMode,
    ips: &[&str],
) -> PodSandboxStatus {
    PodSandboxStatus {
        id: id.to_string(),
        metadata: pkg_cri::types::PodSandboxMetadata {
            name: pod.name.clone(),
            namespace: pod.namespace.clone(),
            uid: pod.uid.clone(),
            attempt,
        },
        state,
        created_at: Utc::now(),
        network: SandboxNetworkStatus {
            namespace_mode: mode,
            ips: ips.iter().map(|s| s.to_string()).collect(),
        },
        labels: HashMap::from([(
            pkg_constants::labels::LABEL_POD_UID.to_string(),
            pod.uid.clone(),
        )]),
        annotations: HashMap::new(),
        runtime_handler: String::new(),
    }
}

pub(crate) fn ready_sandbox(id: &str, pod: &Pod, attempt: u32) -> PodSandboxStatus {
    sandbox_status(
        id,
        pod,
        attempt,
        SandboxState::Ready,
        NamespaceMode::Pod,
        &["10.0.0.5"],
    )
}

/// Container status with labels matching the current spec (hash included),
/// restart count 0.
pub(crate) fn container_status(
    id: &str,
    pod: &Pod,
    name: &str,
    state: ContainerState,
    exit_code: i32,
) -> ContainerStatus {
    let spec = pod.find_container(name).expect("container is in the pod spec");
    let kind = pod.container_kind(name).unwrap_or(ContainerKind::Main);
    let now = Utc::now();
    ContainerStatus {
        id: id.to_string(),
        metadata: pkg_cri::types::ContainerMetadata {
            name: name.to_string(),
            attempt: 0,
        },
        state,
        created_at: now,
        started_at: matches!(state, ContainerState::Running | ContainerState::Exited)
            .then_some(now),
        finished_at: (state == ContainerState::Exited).then_some(now),
        exit_code,
        image: spec.image.clone(),
        reason: String::new(),
        message: String::new(),
        labels: container_labels(pod, spec, kind, &container_spec_hash(spec), 0),
        annotations: HashMap::new(),
    }
}

pub(crate) fn running_status(id: &str, pod: &Pod, name: &str) -> ContainerStatus {
    container_status(id, pod, name, ContainerState::Running, 0)
}

pub(crate) fn exited_status(id: &str, pod: &Pod, name: &str, exit_code: i32) -> ContainerStatus {
    container_status(id, pod, name, ContainerState::Exited, exit_code)
}

pub(crate) fn unknown_status(id: &str, pod: &Pod, name: &str) -> ContainerStatus {
    container_status(id, pod, name, ContainerState::Unknown, 0)
}

/// Assemble a `PodStatus` from hand-built parts. `sandboxes` and
/// `containers` are taken as given (newest first); IPs derive from the
/// newest sandbox when it is ready.
pub(crate) fn pod_status_with(
    pod: &Pod,
    sandboxes: Vec<PodSandboxStatus>,
    containers: Vec<ContainerStatus>,
) -> PodStatus {
    let ips = sandboxes
        .first()
        .filter(|s| s.state == SandboxState::Ready)
        .map(|s| determine_pod_ips(&[], s))
        .unwrap_or_default();
    PodStatus {
        uid: pod.uid.clone(),
        name: pod.name.clone(),
        namespace: pod.namespace.clone(),
        ips,
        sandbox_statuses: sandboxes,
        container_statuses: containers,
    }
}

pub(crate) fn test_log_dir() -> String {
    format!(
        "{}/podsync-test-{}",
        std::env::temp_dir().display(),
        uuid::Uuid::new_v4()
    )
}

// ─── Fake collaborators ────────────────────────────────────────────────────

pub(crate) struct RecordingRecorder {
    events: Mutex<Vec<(EventType, String, String)>>,
}

impl RecordingRecorder {
    pub(crate) fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, reason, _)| reason.clone())
            .collect()
    }
}

impl EventRecorder for RecordingRecorder {
    fn event(&self, _pod: &Pod, event_type: EventType, reason: &str, message: String) {
        self.events
            .lock()
            .unwrap()
            .push((event_type, reason.to_string(), message));
    }
}

pub(crate) struct FakePuller;

#[async_trait]
impl ImagePuller for FakePuller {
    async fn ensure_image(&self, image: &str, _auths: &[ImageAuth]) -> Result<String, SyncError> {
        Ok(format!("sha256:{image}"))
    }
}

pub(crate) struct FakeHooks {
    post_start_fails: AtomicBool,
    pre_stop: Mutex<Vec<String>>,
    post_stop: Mutex<Vec<String>>,
}

impl FakeHooks {
    pub(crate) fn new() -> Self {
        Self {
            post_start_fails: AtomicBool::new(false),
            pre_stop: Mutex::new(Vec::new()),
            post_stop: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn fail_post_start(&self) {
        self.post_start_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn pre_stop_calls(&self) -> Vec<String> {
        self.pre_stop.lock().unwrap().clone()
    }

    pub(crate) fn post_stop_calls(&self) -> Vec<String> {
        self.post_stop.lock().unwrap().clone()
    }
}

#[async_trait]
impl HookRunner for FakeHooks {
    async fn pre_stop(
        &self,
        _pod: &Pod,
        container: &ContainerSpec,
        _container_id: &str,
        _grace_seconds: i64,
    ) -> Result<()> {
        self.pre_stop.lock().unwrap().push(container.name.clone());
        Ok(())
    }

    async fn post_start(
        &self,
        _pod: &Pod,
        container: &ContainerSpec,
        _container_id: &str,
    ) -> Result<()> {
        if self.post_start_fails.load(Ordering::SeqCst) {
            bail!("post-start hook of {} failed", container.name);
        }
        Ok(())
    }
}

impl InternalLifecycle for FakeHooks {
    fn post_stop_container(&self, _pod_uid: &str, container_name: &str) {
        self.post_stop
            .lock()
            .unwrap()
            .push(container_name.to_string());
    }
}

pub(crate) struct FakeLiveness {
    results: DashMap<String, ProbeResult>,
}

impl FakeLiveness {
    pub(crate) fn new() -> Self {
        Self {
            results: DashMap::new(),
        }
    }

    pub(crate) fn set(&self, container_id: &str, result: ProbeResult) {
        self.results.insert(container_id.to_string(), result);
    }
}

impl LivenessManager for FakeLiveness {
    fn result(&self, container_id: &str) -> Option<ProbeResult> {
        self.results.get(container_id).map(|r| *r)
    }
}

// ─── Fake runtime ──────────────────────────────────────────────────────────

pub(crate) struct FakeContainer {
    pub status: ContainerStatus,
    pub sandbox_id: String,
}

/// In-memory `RuntimeService` with an operation journal for ordering
/// assertions.
pub(crate) struct FakeRuntime {
    base: DateTime<Utc>,
    seq: AtomicI64,
    version: String,
    pub sandboxes: DashMap<String, PodSandboxStatus>,
    pub containers: DashMap<String, FakeContainer>,
    fail_next: DashMap<String, String>,
    journal: Mutex<Vec<String>>,
    pub pod_cidr: Mutex<Option<String>>,
    created_names: Mutex<Vec<String>>,
    created_configs: Mutex<Vec<ContainerConfig>>,
}

impl FakeRuntime {
    pub(crate) fn new(version: &str) -> Self {
        Self {
            base: Utc::now(),
            seq: AtomicI64::new(0),
            version: version.to_string(),
            sandboxes: DashMap::new(),
            containers: DashMap::new(),
            fail_next: DashMap::new(),
            journal: Mutex::new(Vec::new()),
            pod_cidr: Mutex::new(None),
            created_names: Mutex::new(Vec::new()),
            created_configs: Mutex::new(Vec::new()),
        }
    }

    fn next_created_at(&self) -> DateTime<Utc> {
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        self.base + chrono::Duration::milliseconds(n)
    }

    fn record(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }

    fn check_fail(&self, op: &str) -> Result<()> {
        if let Some((_, msg)) = self.fail_next.remove(op) {
            bail!("{msg}");
        }
        Ok(())
    }

    /// Make the next call to `op` fail with `msg`.
    pub(crate) fn fail_next(&self, op: &str, msg: &str) {
        self.fail_next.insert(op.to_string(), msg.to_string());
    }

    pub(crate) fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub(crate) fn clear_journal(&self) {
        self.journal.lock().unwrap().clear();
    }

    /// Names of containers created through `create_container`, in order.
    pub(crate) fn created_container_names(&self) -> Vec<String> {
        self.created_names.lock().unwrap().clone()
    }

    /// The most recent creation config for the named container.
    pub(crate) fn created_container_config(&self, name: &str) -> Option<ContainerConfig> {
        self.created_configs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.metadata.name == name)
            .cloned()
    }

    pub(crate) fn seed_sandbox(
        &self,
        id: &str,
        pod: &Pod,
        attempt: u32,
        state: SandboxState,
        ips: &[&str],
    ) {
        let mut status = sandbox_status(id, pod, attempt, state, NamespaceMode::Pod, ips);
        status.created_at = self.next_created_at();
        self.sandboxes.insert(id.to_string(), status);
    }

    pub(crate) fn seed_container(
        &self,
        id: &str,
        sandbox_id: &str,
        pod: &Pod,
        name: &str,
        state: ContainerState,
        restart_count: u32,
    ) {
        let spec = pod.find_container(name).expect("container is in the pod spec");
        let kind = pod.container_kind(name).unwrap_or(ContainerKind::Main);
        let mut status = container_status(id, pod, name, state, 0);
        status.created_at = self.next_created_at();
        status.labels = container_labels(
            pod,
            spec,
            kind,
            &container_spec_hash(spec),
            restart_count,
        );
        self.containers.insert(
            id.to_string(),
            FakeContainer {
                status,
                sandbox_id: sandbox_id.to_string(),
            },
        );
    }

    pub(crate) fn strip_container_labels(&self, id: &str) {
        if let Some(mut container) = self.containers.get_mut(id) {
            container.status.labels.clear();
        }
    }

    fn labels_match(selector: &HashMap<String, String>, labels: &HashMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|have| have == v))
    }
}

#[async_trait]
impl RuntimeService for FakeRuntime {
    async fn version(&self, _api_version: &str) -> Result<VersionInfo> {
        self.check_fail("version")?;
        Ok(VersionInfo {
            version: self.version.clone(),
            runtime_name: "fakeruntime".to_string(),
            runtime_version: "1.0.0".to_string(),
            runtime_api_version: "v1".to_string(),
        })
    }

    async fn status(&self) -> Result<RuntimeStatus> {
        self.check_fail("status")?;
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
        filter: Option<&PodSandboxFilter>,
    ) -> Result<Vec<PodSandbox>> {
        self.check_fail("list_pod_sandbox")?;
        self.record("list_pod_sandbox".to_string());
        let mut out = Vec::new();
        for entry in self.sandboxes.iter() {
            let status = entry.value();
            if let Some(filter) = filter {
                if let Some(id) = &filter.id
                    && id != &status.id
                {
                    continue;
                }
                if let Some(state) = filter.state
                    && state != status.state
                {
                    continue;
                }
                if !Self::labels_match(&filter.label_selector, &status.labels) {
                    continue;
                }
            }
            out.push(PodSandbox {
                id: status.id.clone(),
                metadata: status.metadata.clone(),
                state: status.state,
                created_at: status.created_at,
                labels: status.labels.clone(),
                annotations: status.annotations.clone(),
            });
        }
        Ok(out)
    }

    async fn run_pod_sandbox(
        &self,
        config: &PodSandboxConfig,
        runtime_handler: &str,
    ) -> Result<String> {
        self.record(format!("run_pod_sandbox {}", config.metadata.name));
        self.check_fail("run_pod_sandbox")?;
        let id = format!("sb-{}", self.seq.load(Ordering::SeqCst));
        let status = PodSandboxStatus {
            id: id.clone(),
            metadata: config.metadata.clone(),
            state: SandboxState::Ready,
            created_at: self.next_created_at(),
            network: SandboxNetworkStatus {
                namespace_mode: if config.host_network {
                    NamespaceMode::Node
                } else {
                    NamespaceMode::Pod
                },
                ips: if config.host_network {
                    vec![]
                } else {
                    vec!["10.0.0.5".to_string()]
                },
            },
            labels: config.labels.clone(),
            annotations: config.annotations.clone(),
            runtime_handler: runtime_handler.to_string(),
        };
        self.sandboxes.insert(id.clone(), status);
        Ok(id)
    }

    async fn stop_pod_sandbox(&self, id: &str) -> Result<()> {
        self.record(format!("stop_pod_sandbox {id}"));
        self.check_fail("stop_pod_sandbox")?;
        if let Some(mut sandbox) = self.sandboxes.get_mut(id) {
            sandbox.state = SandboxState::NotReady;
        }
        Ok(())
    }

    async fn pod_sandbox_status(&self, id: &str) -> Result<PodSandboxStatus> {
        self.check_fail("pod_sandbox_status")?;
        match self.sandboxes.get(id) {
            Some(status) => Ok(status.clone()),
            None => bail!("sandbox {id} not found"),
        }
    }

    async fn list_containers(&self, filter: Option<&ContainerFilter>) -> Result<Vec<Container>> {
        self.check_fail("list_containers")?;
        self.record("list_containers".to_string());
        let mut out = Vec::new();
        for entry in self.containers.iter() {
            let container = entry.value();
            if let Some(filter) = filter {
                if let Some(id) = &filter.id
                    && id != &container.status.id
                {
                    continue;
                }
                if let Some(state) = filter.state
                    && state != container.status.state
                {
                    continue;
                }
                if let Some(sandbox_id) = &filter.sandbox_id
                    && sandbox_id != &container.sandbox_id
                {
                    continue;
                }
                if !Self::labels_match(&filter.label_selector, &container.status.labels) {
                    continue;
                }
            }
            out.push(Container {
                id: container.status.id.clone(),
                sandbox_id: container.sandbox_id.clone(),
                metadata: container.status.metadata.clone(),
                image: container.status.image.clone(),
                state: container.status.state,
                created_at: container.status.created_at,
                labels: container.status.labels.clone(),
                annotations: container.status.annotations.clone(),
            });
        }
        Ok(out)
    }

    async fn container_status(&self, id: &str) -> Result<ContainerStatus> {
        self.check_fail("container_status")?;
        match self.containers.get(id) {
            Some(container) => Ok(container.status.clone()),
            None => bail!("container {id} not found"),
        }
    }

    async fn create_container(
        &self,
        sandbox_id: &str,
        config: &ContainerConfig,
        _sandbox_config: &PodSandboxConfig,
    ) -> Result<String> {
        self.record(format!("create_container {}", config.metadata.name));
        self.check_fail("create_container")?;
        let created_at = self.next_created_at();
        let id = format!("c-{}", self.seq.load(Ordering::SeqCst));
        let status = ContainerStatus {
            id: id.clone(),
            metadata: config.metadata.clone(),
            state: ContainerState::Created,
            created_at,
            started_at: None,
            finished_at: None,
            exit_code: 0,
            image: config.image.clone(),
            reason: String::new(),
            message: String::new(),
            labels: config.labels.clone(),
            annotations: config.annotations.clone(),
        };
        self.containers.insert(
            id.clone(),
            FakeContainer {
                status,
                sandbox_id: sandbox_id.to_string(),
            },
        );
        self.created_names
            .lock()
            .unwrap()
            .push(config.metadata.name.clone());
        self.created_configs.lock().unwrap().push(config.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.record(format!("start_container {id}"));
        self.check_fail("start_container")?;
        match self.containers.get_mut(id) {
            Some(mut container) => {
                container.status.state = ContainerState::Running;
                container.status.started_at = Some(Utc::now());
                Ok(())
            }
            None => bail!("container {id} not found"),
        }
    }

    async fn stop_container(&self, id: &str, grace_seconds: i64) -> Result<()> {
        self.record(format!("stop_container {id} grace={grace_seconds}"));
        self.check_fail("stop_container")?;
        if let Some(mut container) = self.containers.get_mut(id) {
            container.status.state = ContainerState::Exited;
            container.status.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.record(format!("remove_container {id}"));
        self.check_fail("remove_container")?;
        self.containers.remove(id);
        Ok(())
    }

    async fn update_runtime_config(&self, network: &NetworkConfig) -> Result<()> {
        self.record("update_runtime_config".to_string());
        self.check_fail("update_runtime_config")?;
        *self.pod_cidr.lock().unwrap() = Some(network.pod_cidr.clone());
        Ok(())
    }
}

// ─── Harness ───────────────────────────────────────────────────────────────

/// A wired-up manager over fake collaborators, with the pod log directory
/// redirected under the system temp dir.
pub(crate) struct TestHarness {
    pub manager: RuntimeManager,
    pub runtime: Arc<FakeRuntime>,
    pub recorder: Arc<RecordingRecorder>,
    pub hooks: Arc<FakeHooks>,
    pub liveness: Arc<FakeLiveness>,
    log_dir: String,
}

impl TestHarness {
    pub(crate) async fn new() -> Self {
        Self::with_config(RuntimeConfig::default()).await
    }

    pub(crate) async fn with_config(config: RuntimeConfig) -> Self {
        Self::build(config, "0.1.0", None).await.unwrap()
    }

    pub(crate) async fn with_log_dir(dir: &str) -> Self {
        Self::build(RuntimeConfig::default(), "0.1.0", Some(dir.to_string()))
            .await
            .unwrap()
    }

    pub(crate) async fn try_new_with_version(version: &str) -> Result<Self> {
        Self::build(RuntimeConfig::default(), version, None).await
    }

    async fn build(
        mut config: RuntimeConfig,
        version: &str,
        log_dir: Option<String>,
    ) -> Result<Self> {
        config.machine_id = "test-node".to_string();
        config.node_ips = vec!["192.168.1.10".to_string()];
        config.pod_log_dir = log_dir.unwrap_or_else(test_log_dir);
        let log_dir = config.pod_log_dir.clone();

        let runtime = Arc::new(FakeRuntime::new(version));
        let recorder = Arc::new(RecordingRecorder::new());
        let hooks = Arc::new(FakeHooks::new());
        let liveness = Arc::new(FakeLiveness::new());

        let manager = RuntimeManager::new(
            config,
            runtime.clone(),
            Arc::new(FakePuller),
            recorder.clone(),
            hooks.clone(),
            hooks.clone(),
            liveness.clone(),
        )
        .await?;

        Ok(Self {
            manager,
            runtime,
            recorder,
            hooks,
            liveness,
            log_dir,
        })
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.log_dir);
    }
}
