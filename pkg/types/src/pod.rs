use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- Resource requirements ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceRequirements {
    /// CPU in millicores (1000 = 1 core)
    #[serde(default)]
    pub cpu_millis: u64,
    /// Memory in bytes
    #[serde(default)]
    pub memory_bytes: u64,
}

// --- Probes ---

/// Liveness probe parameters. Opaque to the reconciler — probing is run by
/// an external liveness manager; the content only participates in the
/// container hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Probe {
    #[serde(default)]
    pub exec_command: Vec<String>,
    #[serde(default)]
    pub http_path: Option<String>,
    #[serde(default)]
    pub period_seconds: u32,
    #[serde(default)]
    pub failure_threshold: u32,
}

// --- Container spec ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub liveness_probe: Option<Probe>,
    /// Command executed inside the container right before it is stopped.
    #[serde(default)]
    pub pre_stop_exec: Vec<String>,
    /// Command executed inside the container right after it starts.
    #[serde(default)]
    pub post_start_exec: Vec<String>,
}

// --- Restart policy ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RestartPolicy {
    #[default]
    Always,
    OnFailure,
    Never,
}

impl std::fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartPolicy::Always => write!(f, "Always"),
            RestartPolicy::OnFailure => write!(f, "OnFailure"),
            RestartPolicy::Never => write!(f, "Never"),
        }
    }
}

// --- Container lifecycle role ---

/// Lifecycle role of a container within its pod. Recorded in CRI labels so
/// the classification survives reconciler restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    Init,
    Main,
    Ephemeral,
    Sidecar,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Init => "init",
            ContainerKind::Main => "main",
            ContainerKind::Ephemeral => "ephemeral",
            ContainerKind::Sidecar => "sidecar",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "init" => Some(ContainerKind::Init),
            "main" => Some(ContainerKind::Main),
            "ephemeral" => Some(ContainerKind::Ephemeral),
            "sidecar" => Some(ContainerKind::Sidecar),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// --- Pod spec ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    /// Ordered: each must exit 0 before the next starts, and all before any
    /// main container starts.
    #[serde(default)]
    pub init_containers: Vec<ContainerSpec>,
    /// Unordered primary workload containers, started concurrently.
    pub containers: Vec<ContainerSpec>,
    /// Late-injected debug containers. Never restarted.
    #[serde(default)]
    pub ephemeral_containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub host_network: bool,
    /// Explicit CRI runtime handler selection, if any.
    #[serde(default)]
    pub runtime_handler: Option<String>,
    #[serde(default)]
    pub termination_grace_period_seconds: Option<i64>,
}

// --- Pod ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub spec: PodSpec,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Pod {
    /// Whether this pod's intended lifecycle is to run to completion.
    /// Classification is annotation-driven and stable per pod UID.
    pub fn is_one_off(&self) -> bool {
        self.annotations
            .get(pkg_constants::labels::ANNOTATION_ONE_OFF)
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    /// Whether the named main-list container is classified as a sidecar.
    pub fn is_sidecar(&self, container_name: &str) -> bool {
        self.annotations
            .get(pkg_constants::labels::ANNOTATION_SIDECARS)
            .map(|v| v.split(',').any(|n| n.trim() == container_name))
            .unwrap_or(false)
    }

    /// Lifecycle role of the named container, looked up across all three
    /// container lists. `None` for names the spec does not mention.
    pub fn container_kind(&self, container_name: &str) -> Option<ContainerKind> {
        if self
            .spec
            .init_containers
            .iter()
            .any(|c| c.name == container_name)
        {
            return Some(ContainerKind::Init);
        }
        if self.spec.containers.iter().any(|c| c.name == container_name) {
            if self.is_sidecar(container_name) {
                return Some(ContainerKind::Sidecar);
            }
            return Some(ContainerKind::Main);
        }
        if self
            .spec
            .ephemeral_containers
            .iter()
            .any(|c| c.name == container_name)
        {
            return Some(ContainerKind::Ephemeral);
        }
        None
    }

    /// Find a container spec by name across init, main and ephemeral lists.
    pub fn find_container(&self, container_name: &str) -> Option<&ContainerSpec> {
        self.spec
            .init_containers
            .iter()
            .chain(self.spec.containers.iter())
            .chain(self.spec.ephemeral_containers.iter())
            .find(|c| c.name == container_name)
    }

    /// Termination grace period in seconds, falling back to the project
    /// default when the spec does not carry one.
    pub fn termination_grace(&self) -> i64 {
        self.spec
            .termination_grace_period_seconds
            .unwrap_or(pkg_constants::runtime::DEFAULT_KILL_GRACE_SECONDS)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
